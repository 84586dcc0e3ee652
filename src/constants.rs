pub mod limits {

    pub const DEFAULT_RUNS_LIMIT: u64 = 20;

    pub const DEFAULT_REPAIR_LIMIT: u64 = 100;
}
