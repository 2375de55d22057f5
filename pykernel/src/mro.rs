use std::sync::Arc;

use crate::{PyError, TypeRef};

/// C3 linearisation of `bases`: the method resolution order of a new type
/// with these bases, without the new type itself at the head.
pub fn calculate(bases: &[TypeRef]) -> Result<Vec<TypeRef>, PyError> {
    match bases {
        [] => Ok(Vec::new()),
        [base] => Ok(base.mro()),
        _ => merge(bases),
    }
}

fn merge(bases: &[TypeRef]) -> Result<Vec<TypeRef>, PyError> {
    let mut sequences: Vec<Vec<TypeRef>> = bases.iter().map(|b| b.mro()).collect();
    sequences.push(bases.to_vec());
    // Consume from the front by reversing each sequence once.
    for seq in &mut sequences {
        seq.reverse();
    }

    let mut result = Vec::new();
    loop {
        sequences.retain(|seq| !seq.is_empty());
        if sequences.is_empty() {
            return Ok(result);
        }
        let candidate = sequences
            .iter()
            .filter_map(|seq| seq.last())
            .find(|head| !in_any_tail(&sequences, head))
            .cloned();
        let Some(next) = candidate else {
            return Err(inconsistent(bases));
        };
        for seq in &mut sequences {
            if seq.last().is_some_and(|head| Arc::ptr_eq(head, &next)) {
                seq.pop();
            }
        }
        result.push(next);
    }
}

fn in_any_tail(sequences: &[Vec<TypeRef>], ty: &TypeRef) -> bool {
    sequences.iter().any(|seq| {
        // reversed: the tail is everything but the last element
        let tail = &seq[..seq.len().saturating_sub(1)];
        tail.iter().any(|t| Arc::ptr_eq(t, ty))
    })
}

fn inconsistent(bases: &[TypeRef]) -> PyError {
    let names: Vec<&str> = bases.iter().map(|b| &**b.name()).collect();
    PyError::type_error(format!(
        "Cannot create a consistent method resolution order (MRO) for bases {}",
        names.join(", ")
    ))
}
