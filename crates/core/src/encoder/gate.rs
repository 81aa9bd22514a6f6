use crate::job::{ErrorKind, JobError};

/// Reject an encode whose output is not smaller than the original.
///
/// With `block_larger` off every size passes.
pub fn quality_gate(size_before: u64, size_after: u64, block_larger: bool) -> Result<(), JobError> {
    if block_larger && size_after >= size_before {
        return Err(JobError::new(
            ErrorKind::EncodedLarger,
            format!(
                "encoded file is not smaller than the original ({} >= {} bytes)",
                size_after, size_before
            ),
        ));
    }
    Ok(())
}
