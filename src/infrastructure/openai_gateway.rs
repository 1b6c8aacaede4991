//! OpenAI 兼容的生成网关
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行 API 调用
//! - 支持自定义 API 端点和模型
//! - 兼容 OpenAI API 的服务（如 Azure, Gemini, Doubao 等）

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::infrastructure::gateway::{GatewayRequest, GenerationGateway};
use crate::infrastructure::{prompts, response};

/// 基于 Chat Completions 的生成网关
pub struct OpenAiGateway {
    client: Client<OpenAIConfig>,
    model_name: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiGateway {
    pub fn new(config: &Config) -> Self {
        // 配置 OpenAI 客户端（兼容 OpenAI API 的服务）
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.llm_api_key)
            .with_api_base(&config.llm_api_base_url);

        Self {
            client: Client::with_config(openai_config),
            model_name: config.llm_model_name.clone(),
            temperature: config.run.temperature,
            max_tokens: config.run.max_tokens,
        }
    }

    /// 构建用户消息：任务描述 + 文档 + 样例 + 输出格式
    fn build_user_message(request: &GatewayRequest) -> String {
        let documents =
            serde_json::to_string_pretty(&request.documents).unwrap_or_else(|_| "[]".to_string());

        let mut message = format!(
            "{}\n\nDOCUMENTS ({} total):\n{}\n",
            request.task,
            request.documents.len(),
            documents
        );

        if let Some(examples) = &request.examples {
            let examples = serde_json::to_string_pretty(examples).unwrap_or_default();
            message.push_str(&format!(
                "\nREFERENCE EXAMPLES (previous decisions per tier):\n{}\n",
                examples
            ));
        }

        message.push_str(&format!(
            "\nOUTPUT FORMAT (respond with JSON only):\n{}",
            prompts::output_schema(request.stage)
        ));
        message
    }

    async fn send(&self, request: &GatewayRequest) -> AppResult<String> {
        let stage = request.stage.as_str();
        let user_message = Self::build_user_message(request);
        debug!("调用 LLM API，阶段: {}, 模型: {}", stage, self.model_name);
        debug!("用户消息长度: {} 字符", user_message.len());

        let build_err = |e: async_openai::error::OpenAIError| {
            AppError::Config(format!("LLM 请求构建失败: {}", e))
        };

        let system_msg = ChatCompletionRequestSystemMessageArgs::default()
            .content(prompts::system_prompt(request.stage))
            .build()
            .map_err(build_err)?;
        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(user_message)
            .build()
            .map_err(build_err)?;

        let chat_request = CreateChatCompletionRequestArgs::default()
            .model(&self.model_name)
            .messages(vec![
                ChatCompletionRequestMessage::System(system_msg),
                ChatCompletionRequestMessage::User(user_msg),
            ])
            .temperature(self.temperature)
            .max_tokens(self.max_tokens)
            .build()
            .map_err(build_err)?;

        let response = self.client.chat().create(chat_request).await.map_err(|e| {
            warn!("LLM API 调用失败 ({}): {}", stage, e);
            AppError::gateway_unavailable(stage, e)
        })?;

        response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| AppError::malformed(stage, "LLM 返回内容为空"))
    }
}

#[async_trait]
impl GenerationGateway for OpenAiGateway {
    async fn generate(&self, request: &GatewayRequest) -> AppResult<JsonValue> {
        let content = self.send(request).await?;
        debug!("LLM API 调用成功，响应 {} 字符", content.len());
        response::extract_json(request.stage.as_str(), &content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::gateway::StageKind;
    use serde_json::json;

    #[test]
    fn test_user_message_contains_documents_and_schema() {
        let request = GatewayRequest::new(
            StageKind::Labeling,
            "Query: \"benefits\"",
            vec![json!({"id": "d1", "title": "India Benefits"})],
        )
        .with_examples(json!({"relevant": ["India Benefits 2024"]}));

        let message = OpenAiGateway::build_user_message(&request);
        assert!(message.starts_with("Query: \"benefits\""));
        assert!(message.contains("DOCUMENTS (1 total)"));
        assert!(message.contains("India Benefits 2024"));
        assert!(message.contains("\"labels\""));
    }

    /// 需要真实的 LLM_API_KEY
    #[tokio::test]
    #[ignore]
    async fn test_live_filter_call() {
        let _ = tracing_subscriber::fmt::try_init();
        let config = Config::from_env().unwrap();
        let gateway = OpenAiGateway::new(&config);

        let request = GatewayRequest::new(
            StageKind::Filter,
            "Query: \"holiday calendar\"\nLocation: India",
            vec![json!({"id": "d1", "title": "India Holiday Calendar 2025", "content_preview": "List of holidays"})],
        );

        match gateway.generate(&request).await {
            Ok(value) => {
                println!("✅ LLM 响应: {}", value);
                assert!(value.get("decisions").is_some());
            }
            Err(e) => panic!("LLM 调用失败: {}", e),
        }
    }
}
