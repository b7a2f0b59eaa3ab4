//! Input/output comparison view
//!
//! The canvas is sized to the output's native resolution and displayed
//! letterboxed inside a visual box of `display` CSS pixels. Slide mode
//! splits the canvas at the slider; hold mode swaps to the input while the
//! pointer is down.
//!
//! A view attached to a [`StateStore`] follows the workbench: new outputs,
//! restaged inputs and module switches are applied as they are published.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::geometry::{contain_fit, Rect, Size};
use crate::error::{Result, WorkbenchError};
use crate::inference::OutputPayload;
use crate::media::Raster;
use crate::state::{AppState, StateStore, Topic};

/// How the output area compares input and output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComparisonMode {
    #[default]
    None,
    Slide,
    Hold,
}

/// Whether comparison controls can be enabled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Availability {
    Available,
    Unavailable(String),
}

impl Availability {
    pub fn is_available(&self) -> bool {
        matches!(self, Availability::Available)
    }
}

/// Comparison renderer for one output area
#[derive(Debug, Clone)]
pub struct ComparisonView {
    display: Size,
    output: Option<Raster>,
    input: Option<Raster>,
    input_source: Option<String>,
    mode: ComparisonMode,
    slider_x: Option<f64>,
    holding: bool,
}

impl ComparisonView {
    /// Create a view whose canvas element is rendered at `display` CSS pixels
    pub fn new(display: Size) -> Self {
        Self {
            display,
            output: None,
            input: None,
            input_source: None,
            mode: ComparisonMode::None,
            slider_x: None,
            holding: false,
        }
    }

    pub fn mode(&self) -> ComparisonMode {
        self.mode
    }

    pub fn slider_x(&self) -> Option<f64> {
        self.slider_x
    }

    pub fn is_holding(&self) -> bool {
        self.holding
    }

    /// Logical canvas size (the output's native resolution)
    pub fn canvas_size(&self) -> Option<Size> {
        self.output
            .as_ref()
            .map(|o| Size::new(o.width as f64, o.height as f64))
    }

    /// Replace the computed output. Comparison resets to `None`.
    pub fn set_output(&mut self, output: Option<Raster>) {
        self.output = output.filter(|r| !r.is_empty());
        self.reset_mode();
    }

    /// Take the raster from a workbench output; text and batch outputs
    /// leave the view without a comparable output.
    pub fn sync_output(&mut self, payload: Option<&OutputPayload>) {
        let raster = match payload {
            Some(OutputPayload::Image(raster)) => Some(raster.clone()),
            _ => None,
        };
        self.set_output(raster);
    }

    /// Replace the original input raster
    pub fn set_input(&mut self, input: Option<Raster>) {
        self.input = input.filter(|r| !r.is_empty());
        if self.input.is_none() {
            self.input_source = None;
            self.reset_mode();
        }
    }

    /// Set the input raster decoded from the staged image at `url`. It is
    /// kept until a different first image is staged.
    pub fn set_input_image(&mut self, url: impl Into<String>, raster: Raster) {
        self.set_input(Some(raster));
        if self.input.is_some() {
            self.input_source = Some(url.into());
        }
    }

    /// Keep `view` in step with `store`: outputs, staged images, module
    /// switches and comparison mode changes are applied as published.
    pub fn attach(view: &Arc<Mutex<ComparisonView>>, store: &StateStore) {
        let target = Arc::clone(view);
        store.subscribe(Topic::OutputChanged, move |state, _| {
            let mut view = target.lock().unwrap_or_else(|e| e.into_inner());
            view.sync_output(state.workbench.output.data.as_ref());
            view.follow_mode(state);
        });

        let target = Arc::clone(view);
        store.subscribe(Topic::ImageInputsChanged, move |state, _| {
            let mut view = target.lock().unwrap_or_else(|e| e.into_inner());
            let first = state.workbench.input.image_urls.first();
            if first.is_none() || first != view.input_source.as_ref() {
                view.set_input(None);
            }
            view.follow_mode(state);
        });

        let target = Arc::clone(view);
        store.subscribe(Topic::ActiveModuleChanged, move |_, _| {
            let mut view = target.lock().unwrap_or_else(|e| e.into_inner());
            view.set_output(None);
            view.set_input(None);
        });

        let target = Arc::clone(view);
        store.subscribe(Topic::ComparisonModeChanged, move |state, _| {
            let mut view = target.lock().unwrap_or_else(|e| e.into_inner());
            view.follow_mode(state);
        });
    }

    /// Enter the store's comparison mode if the view is not already in it
    fn follow_mode(&mut self, state: &AppState) {
        let wanted = state.workbench.output.comparison_mode;
        if self.mode == wanted {
            return;
        }
        if let Err(e) = self.enter_mode(wanted) {
            warn!(mode = ?wanted, error = %e, "comparison view cannot follow mode");
            self.reset_mode();
        }
    }

    /// The canvas element was resized; keep the slider at the same fraction
    pub fn resize_display(&mut self, display: Size) {
        let fraction = self.split_fraction();
        self.display = display;
        if let (Some(fraction), Some(bounds)) = (fraction, self.rendered_bounds()) {
            self.slider_x = Some(bounds.x + fraction * bounds.width);
        }
    }

    pub fn availability(&self) -> Availability {
        if self.output.is_none() {
            return Availability::Unavailable("no single-image output".to_string());
        }
        if self.input.is_none() {
            return Availability::Unavailable("input image not loaded".to_string());
        }
        if self.display.is_empty() {
            return Availability::Unavailable("output area has no size".to_string());
        }
        Availability::Available
    }

    /// On-screen rectangle of the output inside the display box
    pub fn rendered_bounds(&self) -> Option<Rect> {
        let canvas = self.canvas_size()?;
        Some(contain_fit(self.display, canvas))
    }

    /// Switch comparison mode and return the frame to show
    pub fn enter_mode(&mut self, mode: ComparisonMode) -> Result<Raster> {
        if mode != ComparisonMode::None {
            if let Availability::Unavailable(reason) = self.availability() {
                return Err(WorkbenchError::ComparisonUnavailable { reason });
            }
        }

        self.mode = mode;
        self.holding = false;
        self.slider_x = None;

        match mode {
            ComparisonMode::Slide => {
                let bounds = self.bounds_or_unavailable()?;
                let x = bounds.center_x();
                self.slider_x = Some(x);
                debug!(slider_x = x, "entered slide comparison");
                self.composite(x)
            }
            ComparisonMode::Hold | ComparisonMode::None => self.render(),
        }
    }

    /// Horizontal position of the slider as a fraction of the rendered box
    pub fn split_fraction(&self) -> Option<f64> {
        let x = self.slider_x?;
        let bounds = self.rendered_bounds()?;
        if bounds.width <= 0.0 {
            return None;
        }
        Some((x - bounds.x) / bounds.width)
    }

    /// Pointer dragged to `pointer_x` (CSS pixels, relative to the display box)
    pub fn drag_to(&mut self, pointer_x: f64) -> Option<Raster> {
        if self.mode != ComparisonMode::Slide {
            return None;
        }
        let bounds = self.rendered_bounds()?;
        let x = bounds.clamp_x(pointer_x);
        self.slider_x = Some(x);
        self.composite(x).ok()
    }

    /// Pointer pressed over the output area
    pub fn press(&mut self) -> Option<Raster> {
        if self.mode != ComparisonMode::Hold {
            return None;
        }
        let canvas = self.canvas_size()?;
        let input = self.input.as_ref()?;
        self.holding = true;

        let mut frame = Raster::new(canvas.width as u32, canvas.height as u32);
        let dest = contain_fit(canvas, Size::new(input.width as f64, input.height as f64));
        frame.draw_scaled(input, dest, 0.0, canvas.width);
        Some(frame)
    }

    /// Pointer released; back to the plain output
    pub fn release(&mut self) -> Option<Raster> {
        if !self.holding {
            return None;
        }
        self.holding = false;
        self.render().ok()
    }

    /// Plain output frame
    pub fn render(&self) -> Result<Raster> {
        self.output
            .clone()
            .ok_or_else(|| WorkbenchError::ComparisonUnavailable {
                reason: "no single-image output".to_string(),
            })
    }

    fn bounds_or_unavailable(&self) -> Result<Rect> {
        self.rendered_bounds()
            .ok_or_else(|| WorkbenchError::ComparisonUnavailable {
                reason: "no single-image output".to_string(),
            })
    }

    fn reset_mode(&mut self) {
        self.mode = ComparisonMode::None;
        self.slider_x = None;
        self.holding = false;
    }

    /// Input left of the split, output right of it, both contain-fit on the
    /// full logical canvas.
    fn composite(&self, split_visual: f64) -> Result<Raster> {
        let bounds = self.bounds_or_unavailable()?;
        let (Some(output), Some(input)) = (self.output.as_ref(), self.input.as_ref()) else {
            return Err(WorkbenchError::ComparisonUnavailable {
                reason: "input image not loaded".to_string(),
            });
        };

        let canvas = Size::new(output.width as f64, output.height as f64);
        let ratio = canvas.width / bounds.width;
        let split = ((split_visual - bounds.x) * ratio).clamp(0.0, canvas.width);

        let mut frame = Raster::new(output.width, output.height);
        let input_dest = contain_fit(canvas, Size::new(input.width as f64, input.height as f64));
        frame.draw_scaled(input, input_dest, 0.0, split);
        let output_dest = contain_fit(canvas, canvas);
        frame.draw_scaled(output, output_dest, split, canvas.width);
        Ok(frame)
    }
}
