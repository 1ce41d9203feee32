//! Optimistic write guard
//!
//! Template-granular lost-update detection. A write of fields or
//! presentation logic is allowed only when the writer has read the template
//! since the last write. Reads set `component_last_read_at`; writes set
//! `component_last_modified_at` and clear the read mark.

use crate::error::StaleWrite;
use tmpl_store::Template;

/// Check that `template` may be written
///
/// # Errors
/// Returns [`StaleWrite`] when the template was modified after its last
/// read, or was never read since that modification.
pub fn check_write(template: &Template) -> Result<(), StaleWrite> {
    let Some(modified) = template.component_last_modified_at else {
        return Ok(());
    };

    match template.component_last_read_at {
        Some(read) if read >= modified => Ok(()),
        read => Err(StaleWrite {
            template_id: template.id,
            last_modified_at: modified,
            last_read_at: read,
        }),
    }
}
