// Dashboard domain model - Grafana dashboard JSON and grid geometry
use serde::Deserialize;

/// Number of horizontal units in the Grafana layout grid
pub const GRID_WIDTH: i32 = 24;

/// Subtracted from every relative width so that a full row still fits with margins
const RELATIVE_WIDTH_MARGIN: f64 = 0.005;

/// Response of `GET /api/dashboards/uid/{uid}`
#[derive(Debug, Clone, Deserialize)]
pub struct DashboardEntity {
    pub dashboard: DashboardModel,
    #[serde(default)]
    pub meta: DashboardMeta,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DashboardMeta {
    #[serde(default)]
    pub slug: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DashboardModel {
    pub uid: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub panels: Vec<Panel>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct GridPos {
    #[serde(default)]
    pub x: i32,
    #[serde(default)]
    pub y: i32,
    #[serde(default)]
    pub w: i32,
    #[serde(default)]
    pub h: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Panel {
    #[serde(default)]
    pub id: i64,
    #[serde(rename = "type", default)]
    pub panel_type: String,
    #[serde(default)]
    pub collapsed: bool,
    #[serde(rename = "gridPos", default)]
    pub grid_pos: GridPos,
    #[serde(default)]
    pub title: String,
    /// Only populated for panels of type "row"
    #[serde(default)]
    pub panels: Vec<Panel>,
}

impl Panel {
    pub fn is_row(&self) -> bool {
        self.panel_type.eq_ignore_ascii_case("row")
    }

    /// Panel starts at the left edge of the grid
    pub fn is_leftmost(&self) -> bool {
        self.grid_pos.x == 0
    }

    /// Panel ends at the right edge of the grid
    pub fn is_rightmost(&self) -> bool {
        i64::from(self.grid_pos.x) + i64::from(self.grid_pos.w) == i64::from(GRID_WIDTH)
    }

    /// `None` when the grid width does not fit in a pixel count
    pub fn px_width(&self, screen_width: i32) -> Option<i32> {
        units_to_px(self.grid_pos.w, screen_width)
    }

    pub fn px_height(&self, screen_width: i32) -> Option<i32> {
        units_to_px(self.grid_pos.h, screen_width)
    }

    /// Share of the page width taken by the panel, rounded to three decimals
    pub fn relative_width(&self, screen_width: i32) -> f64 {
        if screen_width <= 0 {
            return 0.0;
        }
        let Some(px_width) = self.px_width(screen_width) else {
            return 0.0;
        };
        let ratio = f64::from(px_width) / f64::from(screen_width);
        round_to(ratio, 3) - RELATIVE_WIDTH_MARGIN
    }
}

fn units_to_px(units: i32, screen_width: i32) -> Option<i32> {
    units.checked_mul(screen_width / GRID_WIDTH)
}

/// Round half away from zero to `precision` decimal places
fn round_to(value: f64, precision: i32) -> f64 {
    let ratio = 10f64.powi(precision);
    (value * ratio).round() / ratio
}

/// A horizontal group of panels, either authored as a "row" panel or packed from the grid
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub title: String,
    pub grid_pos: GridPos,
    pub panels: Vec<Panel>,
}

impl Row {
    /// Row seeded from an authored "row" panel; nested panels keep their own coordinates
    pub fn from_row_panel(row_panel: &Panel) -> Self {
        Self {
            title: row_panel.title.clone(),
            grid_pos: row_panel.grid_pos,
            panels: row_panel.panels.clone(),
        }
    }

    /// Untitled row holding a single panel that did not fit in the previous row
    pub fn synthesized(panel: Panel) -> Self {
        Self {
            title: String::new(),
            grid_pos: panel.grid_pos,
            panels: vec![panel],
        }
    }

    /// Summed in `i64`: grid values come straight from dashboard JSON
    pub fn width(&self) -> i64 {
        self.panels.iter().map(|p| i64::from(p.grid_pos.w)).sum()
    }

    pub fn fits(&self, panel: &Panel) -> bool {
        self.width() + i64::from(panel.grid_pos.w) <= i64::from(GRID_WIDTH)
    }
}

/// Dashboard reorganised into rows, ready for panel rendering
#[derive(Debug, Clone)]
pub struct StructuredDashboard {
    pub uid: String,
    pub title: String,
    pub slug: String,
    pub rows: Vec<Row>,
    pub request_id: String,
}

impl StructuredDashboard {
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    pub fn panels(&self) -> impl Iterator<Item = &Panel> {
        self.rows.iter().flat_map(|row| row.panels.iter())
    }

    pub fn panel_count(&self) -> usize {
        self.rows.iter().map(|row| row.panels.len()).sum()
    }
}
