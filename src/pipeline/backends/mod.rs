pub mod command;
pub mod http;
pub mod stub;

pub use command::CommandOcrBackend;
pub use http::{HttpTranslator, HttpVisionBackend};
pub use stub::{StubTranslator, StubVisionBackend};
