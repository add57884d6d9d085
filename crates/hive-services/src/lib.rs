//! hive-services — the User role: job orchestration, validator liaison,
//! inbound dispatch, and the registries they share.

pub mod command;
pub mod dispatch;
pub mod error;
pub mod jobs;
pub mod ledger;
pub mod liaison;
pub mod node;
pub mod orchestrator;
pub mod reputation;
pub mod substrate;
pub mod workers;

pub use command::{command_channel, Command, CommandHandle, CommandProcessor, CommandResponse, CommandStatus};
pub use dispatch::{Disposition, MessageDispatcher};
pub use error::OrchestrationError;
pub use jobs::JobBook;
pub use ledger::PendingLedger;
pub use liaison::{LiaisonSettings, ValidatorLiaison};
pub use node::{NodeInfo, NodeSettings, UserNode};
pub use orchestrator::{JobLimits, JobOrchestrator};
pub use reputation::ReputationLedger;
pub use substrate::{InboundMessage, PeerAddr, PeerSubstrate};
pub use workers::WorkerRegistry;
