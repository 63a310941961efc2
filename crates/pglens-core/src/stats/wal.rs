use super::{ColumnSpec, StatView};

/// `pg_stat_wal` (PostgreSQL 14+). One row per server.
pub struct WalStats;

const COLUMNS: &[ColumnSpec] = &[
    ColumnSpec {
        name: "wal_records",
        description: "Total number of WAL records generated",
    },
    ColumnSpec {
        name: "wal_fpi",
        description: "Total number of WAL full page images generated",
    },
    ColumnSpec {
        name: "wal_bytes",
        description: "Total amount of WAL generated in bytes",
    },
    ColumnSpec {
        name: "wal_buffers_full",
        description: "Number of times WAL data was written to disk because WAL buffers became full",
    },
    ColumnSpec {
        name: "wal_write",
        description: "Number of times WAL buffers were written to disk via XLogWrite request",
    },
    ColumnSpec {
        name: "wal_sync",
        description: "Number of times WAL files were synced to disk via issue_xlog_fsync request",
    },
    ColumnSpec {
        name: "wal_write_time",
        description: "Total amount of time spent writing WAL buffers to disk, in milliseconds",
    },
    ColumnSpec {
        name: "wal_sync_time",
        description: "Total amount of time spent syncing WAL files to disk, in milliseconds",
    },
    ColumnSpec {
        name: "stats_reset",
        description: "Time at which these statistics were last reset",
    },
];

impl StatView for WalStats {
    fn view(&self) -> &'static str {
        "pg_stat_wal"
    }

    fn columns(&self) -> &'static [ColumnSpec] {
        COLUMNS
    }
}
