//! 基础设施层
//!
//! 持有外部资源（LLM 客户端、HTTP 客户端、文件），只暴露能力

pub mod gateway;
pub mod label_studio;
pub mod openai_gateway;
pub mod prompts;
pub mod response;
pub mod retry;
pub mod sink;
pub mod source;

pub use gateway::{GatewayRequest, GenerationGateway, StageKind};
pub use label_studio::LabelStudioClient;
pub use openai_gateway::OpenAiGateway;
pub use retry::RetryingGateway;
pub use sink::{JsonFileSink, LabelStudioSink, ResultSink};
pub use source::{DocumentSource, JsonFileSource, LabelStudioSource};
