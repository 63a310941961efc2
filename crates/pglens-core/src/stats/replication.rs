use super::{ColumnSpec, StatView};

/// `pg_stat_replication`. Empty on servers without standbys.
pub struct ReplicationStats;

const COLUMNS: &[ColumnSpec] = &[
    ColumnSpec {
        name: "pid",
        description: "Process ID of the WAL sender process",
    },
    ColumnSpec {
        name: "usesysid",
        description: "OID of the user logged into this WAL sender process",
    },
    ColumnSpec {
        name: "usename",
        description: "Name of the user logged into this WAL sender process",
    },
    ColumnSpec {
        name: "application_name",
        description: "Name of the application that is connected to this WAL sender",
    },
    ColumnSpec {
        name: "client_addr",
        description: "IP address of the client connected to this WAL sender",
    },
    ColumnSpec {
        name: "client_hostname",
        description: "Host name of the connected client",
    },
    ColumnSpec {
        name: "client_port",
        description: "TCP port number that the client is using for communication",
    },
    ColumnSpec {
        name: "backend_start",
        description: "Time when this process was started",
    },
    ColumnSpec {
        name: "backend_xmin",
        description: "This standby's xmin horizon if hot_standby_feedback is enabled",
    },
    ColumnSpec {
        name: "state",
        description: "Current WAL sender state",
    },
    ColumnSpec {
        name: "sent_lsn",
        description: "Last transaction log position sent on this connection",
    },
    ColumnSpec {
        name: "write_lsn",
        description: "Last transaction log position written to disk by this standby server",
    },
    ColumnSpec {
        name: "flush_lsn",
        description: "Last transaction log position flushed to disk by this standby server",
    },
    ColumnSpec {
        name: "replay_lsn",
        description: "Last transaction log position replayed into the database on this standby server",
    },
    ColumnSpec {
        name: "write_lag",
        description: "Time elapsed between flushing recent WAL locally and receiving notification that this standby server has written it",
    },
    ColumnSpec {
        name: "flush_lag",
        description: "Time elapsed between flushing recent WAL locally and receiving notification that this standby server has flushed it",
    },
    ColumnSpec {
        name: "replay_lag",
        description: "Time elapsed between flushing recent WAL locally and receiving notification that this standby server has applied it",
    },
    ColumnSpec {
        name: "sync_priority",
        description: "Priority of this standby server for being chosen as the synchronous standby",
    },
    ColumnSpec {
        name: "sync_state",
        description: "Synchronous state of this standby server",
    },
    ColumnSpec {
        name: "reply_time",
        description: "Time of last reply message received from standby server",
    },
];

impl StatView for ReplicationStats {
    fn view(&self) -> &'static str {
        "pg_stat_replication"
    }

    fn columns(&self) -> &'static [ColumnSpec] {
        COLUMNS
    }
}
