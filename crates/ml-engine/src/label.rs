use serde::{Deserialize, Serialize};

use crate::error::{MLError, MLResult};

/// Maps estimator class indices back to their string labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelDecoder {
    pub classes: Vec<String>,
}

impl LabelDecoder {
    pub fn new(classes: Vec<String>) -> Self {
        Self { classes }
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn decode(&self, index: usize) -> MLResult<&str> {
        self.classes
            .get(index)
            .map(String::as_str)
            .ok_or_else(|| MLError::Other(format!("class index {index} out of range")))
    }
}
