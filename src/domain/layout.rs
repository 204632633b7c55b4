// Layout reconstruction - Packs the flat Grafana panel list into rows
use super::dashboard::{DashboardEntity, Panel, Row, StructuredDashboard};
use thiserror::Error;

pub const ROWS_LIMIT: usize = 500;
pub const PANELS_LIMIT: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutError {
    #[error(
        "grafana dashboard contains too many rows/panels: rows={rows} (limit={rows_limit}); panels={panels} (limit={panels_limit})"
    )]
    CapacityExceeded {
        rows: usize,
        rows_limit: usize,
        panels: usize,
        panels_limit: usize,
    },
}

/// Rebuild the row layout from the top-level panels in authoring order.
///
/// Row panels whose `collapsed` flag equals `render_collapsed` open a new row
/// with their nested panels as-is; the other row panels are dropped together
/// with everything nested in them. Plain panels are appended to the current
/// row while its width stays within the grid, otherwise they open a new row.
pub fn reconstruct_rows(panels: &[Panel], render_collapsed: bool) -> Result<Vec<Row>, LayoutError> {
    let mut rows: Vec<Row> = Vec::new();
    let mut panels_count = 0usize;

    for panel in panels {
        if panel.is_row() {
            if panel.collapsed == render_collapsed {
                rows.push(Row::from_row_panel(panel));
                panels_count += panel.panels.len();
            }
        } else {
            match rows.last_mut() {
                Some(current) if current.fits(panel) => current.panels.push(panel.clone()),
                _ => rows.push(Row::synthesized(panel.clone())),
            }
            panels_count += 1;
        }

        if rows.len() > ROWS_LIMIT || panels_count > PANELS_LIMIT {
            return Err(LayoutError::CapacityExceeded {
                rows: rows.len(),
                rows_limit: ROWS_LIMIT,
                panels: panels_count,
                panels_limit: PANELS_LIMIT,
            });
        }
    }

    Ok(rows)
}

impl StructuredDashboard {
    /// Build the row structure of a fetched dashboard. The request id is attached later.
    pub fn from_entity(entity: DashboardEntity, render_collapsed: bool) -> Result<Self, LayoutError> {
        let rows = reconstruct_rows(&entity.dashboard.panels, render_collapsed)?;
        Ok(Self {
            uid: entity.dashboard.uid,
            title: entity.dashboard.title,
            slug: entity.meta.slug,
            rows,
            request_id: String::new(),
        })
    }
}
