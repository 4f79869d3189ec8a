use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::{Result, ValidationError};

/// Known model identifiers with an escape hatch for custom IDs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Model {
    DeepSeekR1Free,
    DeepSeekR1,
    OpenAIGpt4oMini,
    Other(String),
}

/// Models offered for selection, cheapest first.
pub const KNOWN_MODELS: [Model; 3] = [
    Model::DeepSeekR1Free,
    Model::DeepSeekR1,
    Model::OpenAIGpt4oMini,
];

impl Model {
    pub fn as_str(&self) -> &str {
        match self {
            Model::DeepSeekR1Free => "deepseek/deepseek-r1:free",
            Model::DeepSeekR1 => "deepseek/deepseek-r1",
            Model::OpenAIGpt4oMini => "openai/gpt-4o-mini",
            Model::Other(other) => other.as_str(),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Model::Other(other) if other.trim().is_empty())
    }
}

impl Default for Model {
    fn default() -> Self {
        Model::DeepSeekR1Free
    }
}

impl From<&str> for Model {
    fn from(value: &str) -> Self {
        Model::from(value.to_string())
    }
}

impl From<String> for Model {
    fn from(value: String) -> Self {
        let trimmed = value.trim();
        match trimmed.to_lowercase().as_str() {
            "deepseek/deepseek-r1:free" => Model::DeepSeekR1Free,
            "deepseek/deepseek-r1" => Model::DeepSeekR1,
            "openai/gpt-4o-mini" => Model::OpenAIGpt4oMini,
            _ => Model::Other(trimmed.to_string()),
        }
    }
}

impl From<Model> for String {
    fn from(value: Model) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Chat roles accepted by the completion endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// A single role-tagged chat turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// What a task request is for. Drives logging and metrics labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Workflow,
    TechStack,
    Explanation,
    ComponentDescription,
    BatchDescriptions,
    RequirementQuestions,
    ConnectivityCheck,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Workflow => "workflow",
            TaskKind::TechStack => "tech_stack",
            TaskKind::Explanation => "explanation",
            TaskKind::ComponentDescription => "component_description",
            TaskKind::BatchDescriptions => "batch_descriptions",
            TaskKind::RequirementQuestions => "requirement_questions",
            TaskKind::ConnectivityCheck => "connectivity_check",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One logical call to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRequest {
    pub kind: TaskKind,
    pub messages: Vec<ChatMessage>,
    /// Overrides the client's selected model for this call only.
    pub model: Option<Model>,
}

impl TaskRequest {
    pub fn new(kind: TaskKind, messages: Vec<ChatMessage>) -> Result<Self> {
        let req = Self {
            kind,
            messages,
            model: None,
        };
        req.validate()?;
        Ok(req)
    }

    pub fn with_model(mut self, model: impl Into<Model>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.messages.is_empty() {
            return Err(ValidationError::new("at least one message is required")
                .with_field("messages")
                .into());
        }
        if let Some(model) = &self.model {
            if model.is_empty() {
                return Err(ValidationError::new("model override is empty")
                    .with_field("model")
                    .into());
            }
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ChatCompletionRequest<'a> {
    pub(crate) model: &'a str,
    pub(crate) messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatCompletionResponse {
    #[serde(default)]
    pub(crate) choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatChoice {
    #[serde(default)]
    pub(crate) message: Option<ChatChoiceMessage>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatChoiceMessage {
    #[serde(default)]
    pub(crate) content: Option<String>,
}

impl ChatCompletionResponse {
    /// Content of the first choice, if present and non-blank.
    pub(crate) fn first_content(self) -> Option<String> {
        self.choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .filter(|c| !c.trim().is_empty())
    }
}

/// Wire value meaning "no preference, the model should choose".
pub const MODEL_DECIDES: &str = "ai-decide";

/// A single wizard answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequirementValue {
    Text(String),
    /// Multi-select answers.
    Choices(Vec<String>),
    ModelDecides,
}

impl RequirementValue {
    /// Human-readable form used inside prompts.
    pub fn to_prompt_text(&self) -> String {
        match self {
            RequirementValue::Text(text) => text.clone(),
            RequirementValue::Choices(items) => items.join(", "),
            RequirementValue::ModelDecides => "No preference (recommend the best option)".into(),
        }
    }

    /// True when the answer contains `needle`, case-insensitively.
    pub fn mentions(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        match self {
            RequirementValue::Text(text) => text.to_lowercase().contains(&needle),
            RequirementValue::Choices(items) => {
                items.iter().any(|i| i.to_lowercase().contains(&needle))
            }
            RequirementValue::ModelDecides => false,
        }
    }

    pub fn is_blank(&self) -> bool {
        match self {
            RequirementValue::Text(text) => text.trim().is_empty(),
            RequirementValue::Choices(items) => items.iter().all(|i| i.trim().is_empty()),
            RequirementValue::ModelDecides => false,
        }
    }
}

impl From<&str> for RequirementValue {
    fn from(value: &str) -> Self {
        RequirementValue::from(value.to_string())
    }
}

impl From<String> for RequirementValue {
    fn from(value: String) -> Self {
        if value == MODEL_DECIDES {
            RequirementValue::ModelDecides
        } else {
            RequirementValue::Text(value)
        }
    }
}

impl From<Vec<String>> for RequirementValue {
    fn from(value: Vec<String>) -> Self {
        RequirementValue::Choices(value)
    }
}

impl Serialize for RequirementValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            RequirementValue::Text(text) => serializer.serialize_str(text),
            RequirementValue::Choices(items) => items.serialize(serializer),
            RequirementValue::ModelDecides => serializer.serialize_str(MODEL_DECIDES),
        }
    }
}

impl<'de> Deserialize<'de> for RequirementValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Choices(Vec<String>),
        }
        Ok(match Raw::deserialize(deserializer)? {
            Raw::Text(text) => RequirementValue::from(text),
            Raw::Choices(items) => RequirementValue::Choices(items),
        })
    }
}

/// Wizard answers keyed by question id (`audience`, `payment`, `scale`, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Requirements(BTreeMap<String, RequirementValue>);

impl Requirements {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<RequirementValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<RequirementValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&RequirementValue> {
        self.0.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &RequirementValue)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Component categories the diagram knows how to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Frontend,
    Backend,
    Database,
    Api,
    Auth,
    Payment,
    Storage,
    Cache,
    Cdn,
    Notification,
    Analytics,
    Monitoring,
    Component,
}

impl NodeType {
    pub const ALL: [NodeType; 13] = [
        NodeType::Frontend,
        NodeType::Backend,
        NodeType::Database,
        NodeType::Api,
        NodeType::Auth,
        NodeType::Payment,
        NodeType::Storage,
        NodeType::Cache,
        NodeType::Cdn,
        NodeType::Notification,
        NodeType::Analytics,
        NodeType::Monitoring,
        NodeType::Component,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Frontend => "frontend",
            NodeType::Backend => "backend",
            NodeType::Database => "database",
            NodeType::Api => "api",
            NodeType::Auth => "auth",
            NodeType::Payment => "payment",
            NodeType::Storage => "storage",
            NodeType::Cache => "cache",
            NodeType::Cdn => "cdn",
            NodeType::Notification => "notification",
            NodeType::Analytics => "analytics",
            NodeType::Monitoring => "monitoring",
            NodeType::Component => "component",
        }
    }

    /// Whitelisted parse; anything unknown becomes `Component`.
    pub fn parse_lossy(raw: &str) -> Self {
        let normalized = raw.trim().to_lowercase();
        NodeType::ALL
            .into_iter()
            .find(|t| t.as_str() == normalized)
            .unwrap_or(NodeType::Component)
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }

    /// Whitelisted parse; anything unknown becomes `Medium`.
    pub fn parse_lossy(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "high" => Priority::High,
            "low" => Priority::Low,
            _ => Priority::Medium,
        }
    }
}

/// One box in the architecture diagram.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowNode {
    pub id: String,
    pub label: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub x: f64,
    pub y: f64,
    /// Ids of downstream nodes. May dangle; the renderer skips unknown ids.
    pub connections: Vec<String>,
    pub description: String,
    pub priority: Priority,
    pub group: String,
}

/// One technology recommendation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TechStackEntry {
    pub id: String,
    pub name: String,
    pub category: String,
    pub reason: String,
}

/// A component whose description is requested from the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentRef {
    pub id: String,
    #[serde(rename = "type")]
    pub component_type: String,
    pub label: String,
}

impl ComponentRef {
    pub fn new(
        id: impl Into<String>,
        component_type: impl Into<String>,
        label: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            component_type: component_type.into(),
            label: label.into(),
        }
    }
}

impl From<&WorkflowNode> for ComponentRef {
    fn from(node: &WorkflowNode) -> Self {
        Self {
            id: node.id.clone(),
            component_type: node.node_type.as_str().to_string(),
            label: node.label.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Error;
    use serde_json::json;

    #[test]
    fn task_request_requires_messages() {
        let err = TaskRequest::new(TaskKind::Workflow, Vec::new()).unwrap_err();
        match err {
            Error::Malformed(ve) => assert_eq!(ve.field.as_deref(), Some("messages")),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn message_roles_serialize_lowercase() {
        let msg = ChatMessage::system("be strict");
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({ "role": "system", "content": "be strict" })
        );
    }

    #[test]
    fn model_parses_known_and_custom_ids() {
        assert_eq!(Model::from("openai/gpt-4o-mini"), Model::OpenAIGpt4oMini);
        assert_eq!(
            Model::from(" mistral/large "),
            Model::Other("mistral/large".into())
        );
        assert_eq!(Model::default().as_str(), "deepseek/deepseek-r1:free");
    }

    #[test]
    fn requirements_deserialize_mixed_values() {
        let reqs: Requirements = serde_json::from_value(json!({
            "payment": "Subscriptions",
            "authentication": ["SSO", "Email/Password"],
            "scale": MODEL_DECIDES,
        }))
        .unwrap();

        assert_eq!(
            reqs.get("payment"),
            Some(&RequirementValue::Text("Subscriptions".into()))
        );
        assert!(reqs.get("authentication").unwrap().mentions("sso"));
        assert_eq!(reqs.get("scale"), Some(&RequirementValue::ModelDecides));
        assert_eq!(
            serde_json::to_value(&reqs).unwrap()["scale"],
            json!(MODEL_DECIDES)
        );
    }

    #[test]
    fn node_type_and_priority_fall_back_to_defaults() {
        assert_eq!(NodeType::parse_lossy("CDN"), NodeType::Cdn);
        assert_eq!(NodeType::parse_lossy("nonsense"), NodeType::Component);
        assert_eq!(Priority::parse_lossy("urgent"), Priority::Medium);
        assert_eq!(Priority::parse_lossy("LOW"), Priority::Low);
    }

    #[test]
    fn first_content_ignores_blank_choices() {
        let resp: ChatCompletionResponse =
            serde_json::from_value(json!({ "choices": [{ "message": { "content": "  " } }] }))
                .unwrap();
        assert_eq!(resp.first_content(), None);

        let resp: ChatCompletionResponse =
            serde_json::from_value(json!({ "choices": [] })).unwrap();
        assert_eq!(resp.first_content(), None);
    }
}
