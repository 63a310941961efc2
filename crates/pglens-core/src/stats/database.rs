use super::{ColumnSpec, StatView, projection};

/// `pg_stat_database`, restricted to the connected database.
pub struct DatabaseStats;

const COLUMNS: &[ColumnSpec] = &[
    ColumnSpec {
        name: "datid",
        description: "OID of a database",
    },
    ColumnSpec {
        name: "datname",
        description: "Name of the database",
    },
    ColumnSpec {
        name: "numbackends",
        description: "Number of backends currently connected to this database",
    },
    ColumnSpec {
        name: "xact_commit",
        description: "Number of transactions in this database that have been committed",
    },
    ColumnSpec {
        name: "xact_rollback",
        description: "Number of transactions in this database that have been rolled back",
    },
    ColumnSpec {
        name: "blks_read",
        description: "Number of disk blocks read in this database",
    },
    ColumnSpec {
        name: "blks_hit",
        description: "Number of times disk blocks were found already in the buffer cache",
    },
    ColumnSpec {
        name: "tup_returned",
        description: "Number of rows returned by queries in this database",
    },
    ColumnSpec {
        name: "tup_fetched",
        description: "Number of rows fetched by queries in this database",
    },
    ColumnSpec {
        name: "tup_inserted",
        description: "Number of rows inserted by queries in this database",
    },
    ColumnSpec {
        name: "tup_updated",
        description: "Number of rows updated by queries in this database",
    },
    ColumnSpec {
        name: "tup_deleted",
        description: "Number of rows deleted by queries in this database",
    },
    ColumnSpec {
        name: "conflicts",
        description: "Number of queries canceled due to conflicts with recovery in this database",
    },
    ColumnSpec {
        name: "temp_files",
        description: "Number of temporary files created by queries in this database",
    },
    ColumnSpec {
        name: "temp_bytes",
        description: "Total amount of data written to temporary files by queries in this database",
    },
    ColumnSpec {
        name: "deadlocks",
        description: "Number of deadlocks detected in this database",
    },
    ColumnSpec {
        name: "checksum_failures",
        description: "Number of data page checksum failures detected in this database",
    },
    ColumnSpec {
        name: "blk_read_time",
        description: "Time spent reading data file blocks by backends in this database, in milliseconds",
    },
    ColumnSpec {
        name: "blk_write_time",
        description: "Time spent writing data file blocks by backends in this database, in milliseconds",
    },
    ColumnSpec {
        name: "stats_reset",
        description: "Time at which these statistics were last reset",
    },
];

impl StatView for DatabaseStats {
    fn view(&self) -> &'static str {
        "pg_stat_database"
    }

    fn columns(&self) -> &'static [ColumnSpec] {
        COLUMNS
    }

    fn query(&self) -> String {
        format!(
            "SELECT {} FROM {} WHERE datname = current_database()",
            projection(COLUMNS),
            self.view()
        )
    }
}
