pub mod reference;
pub mod sync_run;
pub mod title;
