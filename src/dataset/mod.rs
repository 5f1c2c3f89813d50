//! Dataset-capture collaborator contract
//!
//! The pipeline does not aggregate manifests itself; it reports annotation
//! definitions, per-frame annotation handles, and produced files to an
//! external sink implementing the traits here.

use std::path::Path;

use serde::Serialize;

use crate::labeling::{Color, LabelConfig};

/// Result type for dataset operations
pub type DatasetResult<T> = Result<T, DatasetError>;

/// Errors surfaced by the dataset sink during setup
#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("annotation definition already registered: {0}")]
    DuplicateDefinition(String),
    #[error("dataset sink rejected request: {0}")]
    Rejected(String),
}

/// One row of the machine-readable annotation schema: a label name and the
/// exact pixel value it is rendered with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabelSpec {
    pub label_name: String,
    pub pixel_value: Color,
}

/// Describes one annotation stream registered in the dataset manifest.
#[derive(Debug, Clone, Serialize)]
pub struct AnnotationDefinition {
    /// Stable identifier referenced by the manifest. Fixed per annotation
    /// kind, not generated per run.
    pub id: String,
    pub kind: String,
    pub description: String,
    pub format: String,
    pub spec: Vec<LabelSpec>,
}

impl AnnotationDefinition {
    /// Builds the semantic-segmentation definition for a label config,
    /// using the pipeline's fixed definition id.
    pub fn semantic_segmentation(config: &LabelConfig) -> Self {
        Self {
            id: crate::capture::SEGMENTATION_ANNOTATION_ID.to_string(),
            kind: "semantic segmentation".to_string(),
            description: "Generates a semantic segmentation image for each captured frame"
                .to_string(),
            format: "PNG".to_string(),
            spec: config
                .entries()
                .iter()
                .map(|entry| LabelSpec {
                    label_name: entry.label.clone(),
                    pixel_value: entry.color,
                })
                .collect(),
        }
    }

    /// Schema as a JSON value, for sinks that persist definitions verbatim.
    pub fn schema_json(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.id,
            "kind": self.kind,
            "description": self.description,
            "format": self.format,
            "spec": self.spec,
        })
    }
}

/// In-progress annotation for a single captured frame.
///
/// Created before the frame's image exists; told the output file's
/// dataset-relative path once readback resolves. The path is deterministic,
/// so reporting happens before encoding completes.
pub trait AnnotationHandle: Send {
    fn report_file(&self, relative_path: &Path);
}

/// External collaborator owning dataset bookkeeping.
pub trait DatasetSink: Send + Sync {
    fn register_annotation_definition(
        &self,
        definition: &AnnotationDefinition,
    ) -> DatasetResult<()>;

    /// Opens an annotation record for the frame about to be rendered.
    fn report_annotation_async(&self, definition_id: &str) -> Box<dyn AnnotationHandle>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labeling::{Color, LabelEntry};

    #[test]
    fn segmentation_definition_lists_every_label_with_its_color() {
        let config = LabelConfig::new(vec![
            LabelEntry {
                label: "car".to_string(),
                color: Color::rgb(255, 0, 0),
            },
            LabelEntry {
                label: "tree".to_string(),
                color: Color::rgb(0, 255, 0),
            },
        ])
        .expect("valid config");

        let definition = AnnotationDefinition::semantic_segmentation(&config);
        assert_eq!(definition.id, crate::capture::SEGMENTATION_ANNOTATION_ID);
        assert_eq!(definition.spec.len(), 2);
        assert_eq!(definition.spec[0].label_name, "car");
        assert_eq!(definition.spec[0].pixel_value, Color::rgb(255, 0, 0));

        let schema = definition.schema_json();
        assert_eq!(schema["spec"][1]["label_name"], "tree");
        assert_eq!(schema["spec"][1]["pixel_value"]["g"], 255);
    }
}
