use super::{ColumnSpec, StatView, projection};

/// `pg_stat_user_tables`, largest tables first.
pub struct TableStats;

const COLUMNS: &[ColumnSpec] = &[
    ColumnSpec {
        name: "relid",
        description: "OID of a table",
    },
    ColumnSpec {
        name: "schemaname",
        description: "Name of the schema containing this table",
    },
    ColumnSpec {
        name: "relname",
        description: "Name of this table",
    },
    ColumnSpec {
        name: "seq_scan",
        description: "Number of sequential scans initiated on this table",
    },
    ColumnSpec {
        name: "seq_tup_read",
        description: "Number of live rows fetched by sequential scans",
    },
    ColumnSpec {
        name: "idx_scan",
        description: "Number of index scans initiated on this table",
    },
    ColumnSpec {
        name: "idx_tup_fetch",
        description: "Number of live rows fetched by index scans",
    },
    ColumnSpec {
        name: "n_tup_ins",
        description: "Number of rows inserted",
    },
    ColumnSpec {
        name: "n_tup_upd",
        description: "Number of rows updated",
    },
    ColumnSpec {
        name: "n_tup_del",
        description: "Number of rows deleted",
    },
    ColumnSpec {
        name: "n_tup_hot_upd",
        description: "Number of rows HOT updated (i.e., with no separate index update required)",
    },
    ColumnSpec {
        name: "n_live_tup",
        description: "Estimated number of live rows",
    },
    ColumnSpec {
        name: "n_dead_tup",
        description: "Estimated number of dead rows",
    },
    ColumnSpec {
        name: "n_mod_since_analyze",
        description: "Estimated number of rows modified since this table was last analyzed",
    },
    ColumnSpec {
        name: "last_vacuum",
        description: "Last time at which this table was manually vacuumed (not counting VACUUM FULL)",
    },
    ColumnSpec {
        name: "last_autovacuum",
        description: "Last time at which this table was vacuumed by the autovacuum daemon",
    },
    ColumnSpec {
        name: "last_analyze",
        description: "Last time at which this table was manually analyzed",
    },
    ColumnSpec {
        name: "last_autoanalyze",
        description: "Last time at which this table was analyzed by the autovacuum daemon",
    },
    ColumnSpec {
        name: "vacuum_count",
        description: "Number of times this table has been manually vacuumed (not counting VACUUM FULL)",
    },
    ColumnSpec {
        name: "autovacuum_count",
        description: "Number of times this table has been vacuumed by the autovacuum daemon",
    },
    ColumnSpec {
        name: "analyze_count",
        description: "Number of times this table has been manually analyzed",
    },
    ColumnSpec {
        name: "autoanalyze_count",
        description: "Number of times this table has been analyzed by the autovacuum daemon",
    },
];

impl StatView for TableStats {
    fn view(&self) -> &'static str {
        "pg_stat_user_tables"
    }

    fn columns(&self) -> &'static [ColumnSpec] {
        COLUMNS
    }

    fn query(&self) -> String {
        format!(
            "SELECT {} FROM {} ORDER BY n_live_tup DESC",
            projection(COLUMNS),
            self.view()
        )
    }
}
