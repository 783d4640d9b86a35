//! Built-in greeting tools
//!
//! The single-response tool gets a fresh `single-greeting-<uuid>` name on every build,
//! so its identity changes on each registry refresh.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mcprelay_core::{
    InvocationError, Notification, ParamField, ParamKind, ParamSchema, ToolArguments,
    ToolDescriptor, ToolResult,
};
use tracing::debug;
use uuid::Uuid;

use super::{RegisteredTool, ToolCatalog, ToolContext, ToolHandler};

pub const SINGLE_GREET_PREFIX: &str = "single-greeting-";
pub const MULTI_GREET_TOOL: &str = "multi-greet";

fn name_schema() -> ParamSchema {
    ParamSchema::new(vec![ParamField::required(
        "name",
        ParamKind::String,
        "name to greet",
    )])
}

struct SingleGreet;

#[async_trait]
impl ToolHandler for SingleGreet {
    async fn call(&self, args: ToolArguments, _ctx: ToolContext) -> Result<ToolResult, InvocationError> {
        let name = args.require_str("name")?;
        Ok(ToolResult::text(format!("Hey {}! Welcome to my world!", name)))
    }
}

struct MultiGreet {
    spacing: Duration,
}

#[async_trait]
impl ToolHandler for MultiGreet {
    async fn call(&self, args: ToolArguments, ctx: ToolContext) -> Result<ToolResult, InvocationError> {
        let name = args.require_str("name")?;

        for greeting in [format!("First greet to {}", name), format!("Second greet to {}", name)] {
            let delivery = ctx.notify(Notification::info(greeting));
            debug!(
                session_id = %ctx.transport().id(),
                delivery = ?delivery,
                "[MultiGreet] Greeting pushed"
            );
            tokio::time::sleep(self.spacing).await;
        }

        Ok(ToolResult::text("Hope you enjoy your day!"))
    }
}

/// Catalog of the two greeting tools
pub struct GreetCatalog {
    greet_spacing: Duration,
}

impl GreetCatalog {
    pub fn new(greet_spacing: Duration) -> Self {
        Self { greet_spacing }
    }
}

impl Default for GreetCatalog {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

impl ToolCatalog for GreetCatalog {
    fn build(&self) -> Vec<RegisteredTool> {
        vec![
            RegisteredTool {
                descriptor: ToolDescriptor::new(
                    format!("{}{}", SINGLE_GREET_PREFIX, Uuid::new_v4()),
                    "Greet the user once.",
                    name_schema(),
                ),
                handler: Arc::new(SingleGreet),
            },
            RegisteredTool {
                descriptor: ToolDescriptor::new(
                    MULTI_GREET_TOOL,
                    "Greet the user multiple times with delay in between.",
                    name_schema(),
                ),
                handler: Arc::new(MultiGreet {
                    spacing: self.greet_spacing,
                }),
            },
        ]
    }
}
