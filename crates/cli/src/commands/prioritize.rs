//! Manual scoring through the extender verb

use anyhow::Result;
use std::collections::HashMap;
use tabled::Tabled;

use crate::client::{ApiClient, HostPriority, PodMetadata, PodObject, PrioritizeRequest};
use crate::output::{print_info, print_json, print_success, print_table, OutputFormat};

/// Pod labels read by the scheduler's reward attribution
const SERVICE_NAME_LABEL: &str = "servicename";
const ROLE_NAME_LABEL: &str = "rolename";

#[derive(Tabled)]
struct PriorityRow {
    #[tabled(rename = "Node")]
    host: String,
    #[tabled(rename = "Priority")]
    score: i64,
}

pub struct PrioritizeArgs {
    pub pod: String,
    pub namespace: String,
    pub service: String,
    pub role: String,
    pub nodes: Vec<String>,
}

pub fn build_request(args: PrioritizeArgs) -> PrioritizeRequest {
    let labels = HashMap::from([
        (SERVICE_NAME_LABEL.to_string(), args.service),
        (ROLE_NAME_LABEL.to_string(), args.role),
    ]);
    PrioritizeRequest {
        pod: PodObject {
            metadata: PodMetadata {
                name: args.pod,
                namespace: args.namespace,
                labels,
            },
        },
        node_names: args.nodes,
    }
}

/// Score candidate nodes for a pod
///
/// The scheduler treats this as a real decision: it is remembered and
/// learned from on the next cycle.
pub async fn prioritize(client: &ApiClient, args: PrioritizeArgs, format: OutputFormat) -> Result<()> {
    let request = build_request(args);
    let priorities: Vec<HostPriority> = client.post("prioritize", &request).await?;

    match format {
        OutputFormat::Json => print_json(&priorities)?,
        OutputFormat::Table => {
            let best = priorities
                .iter()
                .max_by_key(|p| p.score)
                .filter(|p| p.score > 0)
                .map(|p| p.host.clone());
            print_table(
                priorities
                    .into_iter()
                    .map(|p| PriorityRow {
                        host: p.host,
                        score: p.score,
                    })
                    .collect(),
            );
            match best {
                Some(host) => print_success(&format!("Preferred node: {}", host)),
                None => print_info("Scheduler expressed no preference"),
            }
        }
    }

    Ok(())
}
