pub mod answer;
pub mod attempt;
pub mod catalog;
pub mod payment;
pub mod stream;

pub use answer::{AnsweredTask, ReportResponse, SubmitAnswerRequest};
pub use attempt::{Attempt, AttemptStatus, AttemptSummary, DialogueTurn, Speaker};
pub use catalog::{Profession, ReportTemplate, Scenario, TaskTemplate};
pub use payment::{CreatePaymentRequest, Package, Payment, PaymentStatus, Promocode};
pub use stream::{TaskDone, TaskMetadata, TaskStreamEvent};
