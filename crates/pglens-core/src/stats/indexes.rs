use super::{ColumnSpec, StatView, projection};

/// `pg_stat_user_indexes`, most-scanned first.
pub struct IndexStats;

const COLUMNS: &[ColumnSpec] = &[
    ColumnSpec {
        name: "relid",
        description: "OID of the table for this index",
    },
    ColumnSpec {
        name: "indexrelid",
        description: "OID of this index",
    },
    ColumnSpec {
        name: "schemaname",
        description: "Name of the schema containing this index",
    },
    ColumnSpec {
        name: "relname",
        description: "Name of the table for this index",
    },
    ColumnSpec {
        name: "indexrelname",
        description: "Name of this index",
    },
    ColumnSpec {
        name: "idx_scan",
        description: "Number of index scans initiated on this index",
    },
    ColumnSpec {
        name: "idx_tup_read",
        description: "Number of index entries returned by scans on this index",
    },
    ColumnSpec {
        name: "idx_tup_fetch",
        description: "Number of live table rows fetched by simple index scans using this index",
    },
];

impl StatView for IndexStats {
    fn view(&self) -> &'static str {
        "pg_stat_user_indexes"
    }

    fn columns(&self) -> &'static [ColumnSpec] {
        COLUMNS
    }

    fn query(&self) -> String {
        format!(
            "SELECT {} FROM {} ORDER BY idx_scan DESC",
            projection(COLUMNS),
            self.view()
        )
    }
}
