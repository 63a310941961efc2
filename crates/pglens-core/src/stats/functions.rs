use super::{ColumnSpec, StatView, projection};

/// `pg_stat_user_functions`, most expensive first. Only populated when
/// `track_functions` is enabled on the server.
pub struct FunctionStats;

const COLUMNS: &[ColumnSpec] = &[
    ColumnSpec {
        name: "funcid",
        description: "OID of a function",
    },
    ColumnSpec {
        name: "schemaname",
        description: "Name of the schema containing this function",
    },
    ColumnSpec {
        name: "funcname",
        description: "Name of this function",
    },
    ColumnSpec {
        name: "calls",
        description: "Number of times this function has been called",
    },
    ColumnSpec {
        name: "total_time",
        description: "Total time spent in this function and all other functions called by it, in milliseconds",
    },
    ColumnSpec {
        name: "self_time",
        description: "Total time spent in this function itself, not including other functions called by it, in milliseconds",
    },
];

impl StatView for FunctionStats {
    fn view(&self) -> &'static str {
        "pg_stat_user_functions"
    }

    fn columns(&self) -> &'static [ColumnSpec] {
        COLUMNS
    }

    fn query(&self) -> String {
        format!(
            "SELECT {} FROM {} ORDER BY total_time DESC",
            projection(COLUMNS),
            self.view()
        )
    }
}
