//! Status enums mapping to SMALLINT lookup tables.
//!
//! Each enum variant's discriminant matches the seed data order (1-based)
//! in the corresponding `*_statuses` database table. The enums derive
//! `sqlx::Type`, so row structs hold them directly instead of raw ids.

use factoryos_core::error::CoreError;

/// Status ID type matching SMALLINT/SMALLSERIAL in the database.
pub type StatusId = i16;

macro_rules! define_status_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $val:expr => $label:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr(i16)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type, serde::Serialize)]
        pub enum $name {
            $( $(#[$vmeta])* #[serde(rename = $label)] $variant = $val ),+
        }

        impl $name {
            /// Every variant, in discriminant order.
            pub const ALL: &'static [$name] = &[$( $name::$variant ),+];

            /// Return the database status ID.
            pub fn id(self) -> StatusId {
                self as StatusId
            }

            /// Name as seeded in the lookup table.
            pub fn name(self) -> &'static str {
                match self {
                    $( $name::$variant => $label ),+
                }
            }

            /// Resolve a database status ID.
            pub fn from_id(id: StatusId) -> Option<Self> {
                match id {
                    $( x if x == $val => Some($name::$variant), )+
                    _ => None,
                }
            }
        }

        impl From<$name> for StatusId {
            fn from(value: $name) -> Self {
                value as StatusId
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.name())
            }
        }
    };
}

define_status_enum! {
    /// Printer availability. Telemetry writes all three; the dispatcher only
    /// flips IDLE -> PRINTING on claim and PRINTING -> IDLE on failure.
    PrinterStatus {
        Idle = 1 => "IDLE",
        Printing = 2 => "PRINTING",
        Offline = 3 => "OFFLINE",
    }
}

define_status_enum! {
    /// Print job lifecycle.
    JobStatus {
        Pending = 1 => "PENDING",
        Uploading = 2 => "UPLOADING",
        Printing = 3 => "PRINTING",
        Finished = 4 => "FINISHED",
        Failed = 5 => "FAILED",
    }
}

define_status_enum! {
    /// Order status mirroring aggregate job progress.
    OrderStatus {
        Open = 1 => "OPEN",
        Queued = 2 => "QUEUED",
        Printing = 3 => "PRINTING",
        InProgress = 4 => "IN_PROGRESS",
        Done = 5 => "DONE",
        Failed = 6 => "FAILED",
    }
}

impl JobStatus {
    /// Whether the job can move from `self` to `next`.
    ///
    /// Forward only: PENDING -> UPLOADING -> PRINTING -> FINISHED, plus
    /// FAILED from any non-terminal state.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Uploading)
                | (Uploading, Printing)
                | (Printing, Finished)
                | (Pending | Uploading | Printing, Failed)
        )
    }

    /// States from which `next` may be entered.
    pub fn predecessors(next: JobStatus) -> Vec<JobStatus> {
        Self::ALL
            .iter()
            .copied()
            .filter(|from| from.can_transition_to(next))
            .collect()
    }

    /// Predecessor ids, ready to bind as a SMALLINT array.
    pub fn predecessor_ids(next: JobStatus) -> Vec<StatusId> {
        Self::predecessors(next).into_iter().map(Self::id).collect()
    }

    /// FINISHED and FAILED end the job's life in the dispatcher.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Finished | JobStatus::Failed)
    }

    /// Validate a transition, returning the new status.
    pub fn transition(self, next: JobStatus) -> Result<JobStatus, CoreError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(CoreError::IllegalTransition {
                entity: "job",
                from: self.name(),
                to: next.name(),
            })
        }
    }
}
