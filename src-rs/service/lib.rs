pub mod http_service;
pub mod session;
pub mod types;

pub use http_service::HttpGenerationService;
pub use session::{HttpSession, Session, StaticSession};
pub use types::{
    GenerationError, GenerationService, ImageUploader, ImmediateResult, StatusReport, SubmitAccepted,
    SubmitRequest,
};
