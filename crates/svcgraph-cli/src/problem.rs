//! Problem files: the concept hierarchy, the service catalog and the task.
//!
//! ```json
//! {
//!   "concepts": [{ "name": "sedan", "parent": "car" }],
//!   "services": [
//!     { "name": "dealer", "inputs": ["money"], "outputs": ["sedan"],
//!       "qos": { "time": 2.0, "cost": 9.5, "availability": 0.99, "reliability": 0.97 } }
//!   ],
//!   "task": { "inputs": ["money"], "outputs": ["sedan"] }
//! }
//! ```
//!
//! `concepts` and `qos` are optional; a missing QoS is neutral.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use svcgraph_core::{CoreError, Qos, ServiceNode, TaxonomyIndex};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Problem {
    #[serde(default)]
    pub concepts: Vec<Concept>,
    pub services: Vec<Service>,
    pub task: Task,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Concept {
    pub name: String,
    #[serde(default)]
    pub parent: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Service {
    pub name: String,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    #[serde(default)]
    pub qos: Qos,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Task {
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
}

#[derive(Debug, Error)]
pub enum ProblemError {
    #[error("failed to read '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed problem file '{}': {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("invalid catalog: {0}")]
    Catalog(#[from] CoreError),
}

impl Problem {
    pub fn load(path: &Path) -> Result<Self, ProblemError> {
        let text = std::fs::read_to_string(path).map_err(|source| ProblemError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ProblemError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Builds the catalog. Services are indexed in file order.
    pub fn taxonomy(&self) -> Result<TaxonomyIndex, ProblemError> {
        let mut builder = TaxonomyIndex::builder();
        for concept in &self.concepts {
            builder = builder.concept(concept.name.as_str(), concept.parent.as_deref());
        }
        for service in &self.services {
            builder = builder.service(
                service.name.as_str(),
                service.inputs.iter().cloned(),
                service.outputs.iter().cloned(),
                service.qos,
            );
        }
        Ok(builder.goal(self.task.outputs.iter().cloned()).build()?)
    }

    pub fn start(&self) -> ServiceNode {
        ServiceNode::start(self.task.inputs.iter().cloned())
    }

    pub fn end(&self) -> ServiceNode {
        ServiceNode::end(self.task.outputs.iter().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use svcgraph_core::{ServiceId, Taxonomy};

    const VEHICLES: &str = r#"{
        "concepts": [
            { "name": "car" },
            { "name": "sedan", "parent": "car" }
        ],
        "services": [
            { "name": "dealer", "inputs": ["money"], "outputs": ["sedan"],
              "qos": { "time": 2.0, "cost": 9.5, "availability": 0.99, "reliability": 0.97 } },
            { "name": "garage", "inputs": ["car"], "outputs": ["repair"] }
        ],
        "task": { "inputs": ["money"], "outputs": ["repair"] }
    }"#;

    #[test]
    fn parses_and_builds_catalog() {
        let problem: Problem = serde_json::from_str(VEHICLES).unwrap();
        let tax = problem.taxonomy().unwrap();

        assert_eq!(tax.service_count(), 2);
        assert_eq!(tax.service_index("garage"), Some(ServiceId(1)));
        assert!(tax.satisfies("sedan", "car"));
        assert!(tax.is_goal_output("repair"));
        assert_eq!(tax.service(ServiceId(0)).unwrap().qos.cost, 9.5);
        assert_eq!(tax.service(ServiceId(1)).unwrap().qos, Qos::neutral());
        assert!(problem.start().outputs.contains("money"));
        assert!(problem.end().inputs.contains("repair"));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = serde_json::from_str::<Problem>(
            r#"{ "services": [], "task": { "inputs": [], "outputs": [] }, "seed": 3 }"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("seed"));
    }

    #[test]
    fn duplicate_services_are_a_catalog_error() {
        let problem: Problem = serde_json::from_str(
            r#"{
                "services": [
                    { "name": "a", "inputs": ["x"], "outputs": ["y"] },
                    { "name": "a", "inputs": ["y"], "outputs": ["z"] }
                ],
                "task": { "inputs": ["x"], "outputs": ["z"] }
            }"#,
        )
        .unwrap();
        assert!(matches!(
            problem.taxonomy(),
            Err(ProblemError::Catalog(CoreError::DuplicateService { .. }))
        ));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = Problem::load(Path::new("/nonexistent/problem.json")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/problem.json"));
    }
}
