use crate::error::{MockSmithError, Result};

/// Split a row request into provider-sized sub-batches.
///
/// Produces `total_rows / batch_size` full batches followed by one trailing
/// batch of the remainder, if any. Zero rows plan no batches.
pub fn plan_batches(total_rows: usize, batch_size: usize) -> Result<Vec<usize>> {
    if batch_size == 0 {
        return Err(MockSmithError::InvalidArgument {
            message: "batch size must be greater than zero".to_string(),
        });
    }

    let full = total_rows / batch_size;
    let remainder = total_rows % batch_size;

    let mut batches = Vec::with_capacity(if remainder > 0 { full + 1 } else { full });
    batches.extend(std::iter::repeat_n(batch_size, full));
    if remainder > 0 {
        batches.push(remainder);
    }
    Ok(batches)
}
