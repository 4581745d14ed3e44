mod device;
mod toolkit;

use std::process;
use std::rc::Rc;

use dashpanel_runtime::{EngineConfig, Gesture, HostBindings, ItemAddress, PageInput};
use tracing::error;
use tracing_subscriber::EnvFilter;

use crate::device::SimulatedDevice;
use crate::toolkit::SlintToolkit;

slint::include_modules!();

struct DashHostBindings;

impl HostBindings for DashHostBindings {
    type Ui = AppWindow;
    type Toolkit = SlintToolkit;
    type Device = SimulatedDevice;

    fn new_ui() -> Result<AppWindow, slint::PlatformError> {
        AppWindow::new()
    }

    fn toolkit(ui: &AppWindow) -> SlintToolkit {
        SlintToolkit::new(ui)
    }

    fn device(_ui: &AppWindow, config: &EngineConfig) -> SimulatedDevice {
        SimulatedDevice::new(config)
    }

    fn bind_item_gesture<F>(ui: &AppWindow, handler: F)
    where
        F: Fn(ItemAddress, Gesture) + 'static,
    {
        ui.on_item_gesture(move |page, item, long| {
            let (Ok(page), Ok(item)) = (usize::try_from(page), usize::try_from(item)) else {
                return;
            };
            handler(ItemAddress { page, item }, gesture(long));
        });
    }

    fn bind_button_gesture<F>(ui: &AppWindow, handler: F)
    where
        F: Fn(usize, Gesture) + 'static,
    {
        ui.on_button_gesture(move |index, long| {
            if let Ok(index) = usize::try_from(index) {
                handler(index, gesture(long));
            }
        });
    }

    fn bind_page_input<F>(ui: &AppWindow, handler: F)
    where
        F: Fn(PageInput) + 'static,
    {
        let handler = Rc::new(handler);

        let back = Rc::clone(&handler);
        ui.on_back(move || back(PageInput::Back));

        let toggle = Rc::clone(&handler);
        ui.on_dashboard_toggle(move || toggle(PageInput::DashboardToggle));

        let close = Rc::clone(&handler);
        ui.on_overlay_close(move || close(PageInput::OverlayClose));

        ui.on_overlay_change(move |feature, value| {
            if let Ok(feature) = usize::try_from(feature) {
                handler(PageInput::OverlayChange { feature, value });
            }
        });
    }
}

fn gesture(long: bool) -> Gesture {
    if long {
        Gesture::LongPress
    } else {
        Gesture::Tap
    }
}

fn main() {
    // stdout carries protocol frames; logs go to stderr.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    if let Err(err) = dashpanel_runtime::run::<DashHostBindings>() {
        error!(%err, "dash_host fatal error");
        process::exit(1);
    }
}
