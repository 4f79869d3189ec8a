//! Deterministic substitutes used whenever the model path fails.
//!
//! Everything here is a pure function of its inputs: no I/O, no randomness.

use crate::types::{
    NodeType, Priority, RequirementValue, Requirements, TechStackEntry, WorkflowNode,
};

/// Idea/feature keywords that add media storage and a CDN.
pub const MEDIA_KEYWORDS: &[&str] = &["video", "stream", "media", "movie", "podcast"];

/// Scale answers (substring, lowercase) that add a cache and monitoring.
pub const LARGE_SCALE_MARKERS: &[&str] = &["10k-100k", "100k+", "enterprise"];

/// Payment answer meaning no payment node is needed.
pub const NO_PAYMENT_MARKER: &str = "no payment";

struct NodeSpec {
    id: &'static str,
    label: &'static str,
    node_type: NodeType,
    x: f64,
    y: f64,
    description: &'static str,
    priority: Priority,
    group: &'static str,
}

const FRONTEND: NodeSpec = NodeSpec {
    id: "frontend",
    label: "Web Frontend",
    node_type: NodeType::Frontend,
    x: 100.0,
    y: 200.0,
    description: "User-facing web application",
    priority: Priority::High,
    group: "client",
};

const AUTH: NodeSpec = NodeSpec {
    id: "auth",
    label: "Authentication",
    node_type: NodeType::Auth,
    x: 300.0,
    y: 100.0,
    description: "Sign-up, login and session management",
    priority: Priority::High,
    group: "core",
};

const API: NodeSpec = NodeSpec {
    id: "api",
    label: "API Gateway",
    node_type: NodeType::Api,
    x: 300.0,
    y: 300.0,
    description: "Entry point routing client requests to services",
    priority: Priority::High,
    group: "core",
};

const BACKEND: NodeSpec = NodeSpec {
    id: "backend",
    label: "Application Server",
    node_type: NodeType::Backend,
    x: 500.0,
    y: 200.0,
    description: "Business logic and service orchestration",
    priority: Priority::High,
    group: "core",
};

const DATABASE: NodeSpec = NodeSpec {
    id: "database",
    label: "Primary Database",
    node_type: NodeType::Database,
    x: 700.0,
    y: 200.0,
    description: "Persistent storage for application data",
    priority: Priority::High,
    group: "data",
};

const STORAGE: NodeSpec = NodeSpec {
    id: "storage",
    label: "Media Storage",
    node_type: NodeType::Storage,
    x: 700.0,
    y: 350.0,
    description: "Object storage for uploaded media files",
    priority: Priority::Medium,
    group: "data",
};

const CDN: NodeSpec = NodeSpec {
    id: "cdn",
    label: "Content Delivery Network",
    node_type: NodeType::Cdn,
    x: 500.0,
    y: 450.0,
    description: "Edge caching and delivery of media content",
    priority: Priority::Medium,
    group: "delivery",
};

const PAYMENT: NodeSpec = NodeSpec {
    id: "payment",
    label: "Payment Gateway",
    node_type: NodeType::Payment,
    x: 900.0,
    y: 200.0,
    description: "Checkout, billing and subscription handling",
    priority: Priority::Medium,
    group: "integrations",
};

const CACHE: NodeSpec = NodeSpec {
    id: "cache",
    label: "Cache Layer",
    node_type: NodeType::Cache,
    x: 700.0,
    y: 50.0,
    description: "In-memory cache for hot reads",
    priority: Priority::Medium,
    group: "data",
};

const MONITORING: NodeSpec = NodeSpec {
    id: "monitoring",
    label: "Monitoring",
    node_type: NodeType::Monitoring,
    x: 900.0,
    y: 400.0,
    description: "Metrics, logs and alerting",
    priority: Priority::Low,
    group: "operations",
};

impl NodeSpec {
    fn build(&self, connections: &[&str]) -> WorkflowNode {
        WorkflowNode {
            id: self.id.to_string(),
            label: self.label.to_string(),
            node_type: self.node_type,
            x: self.x,
            y: self.y,
            connections: connections.iter().map(|c| c.to_string()).collect(),
            description: self.description.to_string(),
            priority: self.priority,
            group: self.group.to_string(),
        }
    }
}

/// Which optional parts of the baseline architecture the inputs call for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FallbackFeatures {
    pub media: bool,
    pub payment: bool,
    pub large_scale: bool,
}

impl FallbackFeatures {
    pub fn detect(idea: &str, requirements: &Requirements) -> Self {
        let idea = idea.to_lowercase();
        let features = requirements.get("features");
        let media = MEDIA_KEYWORDS.iter().any(|k| {
            idea.contains(k) || features.map(|f| f.mentions(k)).unwrap_or(false)
        });

        let payment = match requirements.get("payment") {
            Some(RequirementValue::ModelDecides) | None => false,
            Some(value) => !value.is_blank() && !value.mentions(NO_PAYMENT_MARKER),
        };

        let large_scale = requirements
            .get("scale")
            .map(|scale| LARGE_SCALE_MARKERS.iter().any(|m| scale.mentions(m)))
            .unwrap_or(false);

        Self {
            media,
            payment,
            large_scale,
        }
    }
}

/// Baseline architecture: frontend, auth, api, backend, database, plus
/// storage/cdn, payment and cache/monitoring when the inputs call for them.
pub fn fallback_workflow(idea: &str, requirements: &Requirements) -> Vec<WorkflowNode> {
    let features = FallbackFeatures::detect(idea, requirements);

    let mut frontend_links = vec!["auth", "api"];
    let mut backend_links = vec!["database"];
    if features.media {
        frontend_links.push("cdn");
        backend_links.push("storage");
    }
    if features.payment {
        backend_links.push("payment");
    }
    if features.large_scale {
        backend_links.push("cache");
    }

    let mut nodes = vec![
        FRONTEND.build(&frontend_links),
        AUTH.build(&["backend"]),
        API.build(&["backend"]),
        BACKEND.build(&backend_links),
        DATABASE.build(&[]),
    ];
    if features.media {
        nodes.push(STORAGE.build(&["cdn"]));
        nodes.push(CDN.build(&[]));
    }
    if features.payment {
        nodes.push(PAYMENT.build(&[]));
    }
    if features.large_scale {
        nodes.push(CACHE.build(&[]));
        nodes.push(MONITORING.build(&["backend"]));
    }
    nodes
}

fn entry(id: &str, name: &str, category: &str, reason: &str) -> TechStackEntry {
    TechStackEntry {
        id: id.to_string(),
        name: name.to_string(),
        category: category.to_string(),
        reason: reason.to_string(),
    }
}

/// Fixed six-entry stack, one per category.
pub fn fallback_tech_stack() -> Vec<TechStackEntry> {
    vec![
        entry(
            "react",
            "React + TypeScript",
            "frontend",
            "Large ecosystem and strong typing for a maintainable user interface.",
        ),
        entry(
            "nodejs",
            "Node.js + Express",
            "backend",
            "Same language as the frontend and fast to build APIs with.",
        ),
        entry(
            "postgresql",
            "PostgreSQL",
            "database",
            "Reliable relational database with rich data types.",
        ),
        entry(
            "vercel",
            "Vercel",
            "deployment",
            "Zero-config deployments with preview environments.",
        ),
        entry(
            "auth0",
            "Auth0",
            "authentication",
            "Managed authentication with social login and MFA out of the box.",
        ),
        entry(
            "stripe",
            "Stripe",
            "payment",
            "Well-documented payments API covering one-time and recurring billing.",
        ),
    ]
}

/// Three-bullet markdown blurb for a component.
pub fn fallback_description(component_type: &str, label: &str, idea: Option<&str>) -> String {
    let kind = component_type.trim();
    let kind = if kind.is_empty() { "component" } else { kind };
    let label = label.trim();
    let label = if label.is_empty() { "This component" } else { label };
    let context = match idea.map(str::trim).filter(|i| !i.is_empty()) {
        Some(idea) => format!(" in {idea}"),
        None => String::new(),
    };
    format!(
        "**{label}** is the {kind} layer{context}.\n\n\
         - Handles the core {kind} responsibilities of the system\n\
         - Exposes a clear interface to the components it connects to\n\
         - Can be scaled and replaced independently as requirements grow"
    )
}

/// One-sentence summary of the architecture.
pub fn fallback_explanation(idea: &str, node_count: usize) -> String {
    let idea = idea.trim();
    let subject = if idea.is_empty() { "your project" } else { idea };
    format!(
        "This architecture for {subject} is organized into {node_count} components: \
         the frontend talks to authentication and the API, the API hands requests to \
         the application server, and the server persists data in the database."
    )
}

/// The wizard's own questions, used when the model cannot suggest better ones.
pub fn fallback_requirement_questions() -> String {
    [
        "1. Who is your target audience?",
        "2. What are the core features you envision?",
        "3. What authentication methods do you need?",
        "4. Do you need payment processing?",
        "5. What scale are you planning for?",
        "6. Any specific third-party integrations needed?",
    ]
    .join("\n")
}
