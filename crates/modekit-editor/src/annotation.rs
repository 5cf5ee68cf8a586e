//! Diagnostics attached to document positions.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationKind {
    #[default]
    Error,
    Warning,
    Info,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    pub row: usize,
    pub column: usize,
    pub text: String,
    #[serde(rename = "type", default)]
    pub kind: AnnotationKind,
}

/// Receives the annotations produced by background analysis.
pub trait AnnotationSink {
    fn set_annotations(&mut self, annotations: Vec<Annotation>);

    fn clear_annotations(&mut self);
}

impl AnnotationSink for Vec<Annotation> {
    fn set_annotations(&mut self, annotations: Vec<Annotation>) {
        *self = annotations;
    }

    fn clear_annotations(&mut self) {
        self.clear();
    }
}
