use crate::labels::LabelCatalog;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum InterpretError {
    #[error("model returned no scores")]
    Empty,
    #[error("model returned a NaN score at index {0}")]
    NotANumber(usize),
    #[error("model returned a non-finite top score at index {0}")]
    NotFinite(usize),
    #[error("model returned {got} scores for {expected} classes")]
    LengthMismatch { expected: usize, got: usize },
}

/// Response body of a successful prediction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationResult {
    #[serde(rename = "class")]
    pub label: String,
    pub confidence: f64,
    pub solution: String,
}

/// Index and value of the highest score; the first index wins on ties.
pub fn argmax(scores: &[f32]) -> Result<(usize, f32), InterpretError> {
    if let Some(index) = scores.iter().position(|score| score.is_nan()) {
        return Err(InterpretError::NotANumber(index));
    }

    let (index, value) = scores
        .iter()
        .copied()
        .enumerate()
        .reduce(|best, candidate| if candidate.1 > best.1 { candidate } else { best })
        .ok_or(InterpretError::Empty)?;

    if !value.is_finite() {
        return Err(InterpretError::NotFinite(index));
    }
    Ok((index, value))
}

pub fn round_confidence(value: f32) -> f64 {
    (f64::from(value) * 100.).round_ties_even() / 100.
}

pub fn interpret(
    scores: &[f32],
    catalog: &LabelCatalog,
) -> Result<ClassificationResult, InterpretError> {
    if scores.len() != catalog.len() {
        return Err(InterpretError::LengthMismatch {
            expected: catalog.len(),
            got: scores.len(),
        });
    }

    let (index, max_score) = argmax(scores)?;
    let label = catalog
        .get_label(index)
        .ok_or(InterpretError::LengthMismatch {
            expected: catalog.len(),
            got: scores.len(),
        })?;

    let result = ClassificationResult {
        label: label.to_string(),
        confidence: round_confidence(max_score),
        solution: catalog.solution_for(label).to_string(),
    };

    tracing::debug!(
        "Predicted class: {}, confidence: {:.2}, index: {}",
        result.label,
        max_score,
        index
    );

    Ok(result)
}
