pub mod answer;
pub mod case;
pub mod disclosure;
pub mod event;
pub mod report;
pub mod session;
pub mod task;
pub mod unit;

pub use answer::{AttemptRecord, CheckReply, Outcome, MAX_ATTEMPTS};
pub use case::{CaseSnapshot, CaseState, EpisodeEnvelope};
pub use disclosure::{DisclosureKind, DisclosureTrigger};
pub use event::SessionEvent;
pub use session::{Applied, Change, InteractionSession, SessionSnapshot, SessionStatus};
pub use unit::{AnswerableUnit, Hint, UnitHandle};
