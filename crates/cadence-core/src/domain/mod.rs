//! Domain - ID・定義・インスタンス・結果・イベント・エラー

pub mod definition;
pub mod errors;
pub mod events;
pub mod ids;
pub mod instance;
pub mod outcome;
pub mod priority;
pub mod state;

pub use self::definition::{ExecutionPolicy, HandlerRef, Schedule, TaskDefinition};
pub use self::errors::{HandlerError, SchedulerError, TaskError};
pub use self::events::{EventKind, SchedulerEvent};
pub use self::ids::{DefinitionId, InstanceId, ListenerId};
pub use self::instance::TaskInstance;
pub use self::outcome::TaskResult;
pub use self::priority::Priority;
pub use self::state::InstanceStatus;
