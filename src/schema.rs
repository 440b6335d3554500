/// Column-name constants for the ridership engine.
/// Single source of truth - exported to Python via PyO3.

// ── Ridership source columns ────────────────────────────────────────────────
pub mod ridership {
    pub const TIMESTAMP: &str = "timestamp";
    pub const SERVICE: &str = "service";
    pub const TICKET_TYPE: &str = "ticket_type";
    pub const TICKET_GROUP: &str = "ticket_group";
    pub const DAY_TYPE: &str = "day_type";
    pub const COUNT: &str = "count";

    pub const REQUIRED: [&str; 6] = [TIMESTAMP, SERVICE, TICKET_TYPE, TICKET_GROUP, DAY_TYPE, COUNT];
}

// ── Columns derived once at load time ───────────────────────────────────────
pub mod derived {
    pub const YEAR: &str = "year";
    pub const FISCAL_YEAR: &str = "fiscal_year";
    pub const YEAR_MONTH: &str = "year_month";
}

// ── Auxiliary notes table ───────────────────────────────────────────────────
pub mod notes {
    pub const YEAR: &str = "year";
    pub const FISCAL_YEAR: &str = "fiscal_year";
    pub const NOTE: &str = "note";
    pub const SERVICE: &str = "service";

    pub const REQUIRED: [&str; 4] = [YEAR, FISCAL_YEAR, NOTE, SERVICE];
}

// ── Aggregated view columns ─────────────────────────────────────────────────
pub mod views {
    pub const TOTAL: &str = "total";
    pub const PERCENT: &str = "percent";
    pub const LABEL: &str = "label";
    pub const PERIOD: &str = "Year-Month";
    pub const ROW_TOTAL: &str = "Month Total";
}
