pub mod assembler;
pub mod buttons;
pub mod config;
pub mod decoder;
pub mod engine;
pub mod error;
pub mod glyph;
pub mod item;
pub mod overlay;
pub mod page;
pub mod pool;
pub mod protocol;
pub mod router;
pub mod theme;
pub mod toolkit;

#[cfg(test)]
mod testing;

use crate::protocol::{event_envelope, reader_loop, ready_envelope, writer_loop};
use slint::ComponentHandle;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::thread;
use std::time::Instant;
use tracing::{debug, error, warn};

pub use crate::config::EngineConfig;
pub use crate::engine::DashboardEngine;
pub use crate::item::ItemAddress;
pub use crate::protocol::{
    CONTROLLER_TO_DEVICE_CAP, ControllerEnvelope, DEVICE_TO_CONTROLLER_CAP, DeviceEnvelope,
};
pub use crate::router::{
    ButtonEventListener, EventSink, Gesture, ItemEventListener, OutboundEvent, PageEventListener,
    PageInput,
};
pub use crate::toolkit::{DeviceIo, NodeHandle, Toolkit};
pub use serde_json;

/// What a concrete window binding supplies to [`run`].
pub trait HostBindings {
    type Ui: ComponentHandle + 'static;
    type Toolkit: Toolkit + 'static;
    type Device: DeviceIo + 'static;

    fn new_ui() -> Result<Self::Ui, slint::PlatformError>;

    fn toolkit(ui: &Self::Ui) -> Self::Toolkit;

    fn device(ui: &Self::Ui, config: &EngineConfig) -> Self::Device;

    fn bind_item_gesture<F>(ui: &Self::Ui, handler: F)
    where
        F: Fn(ItemAddress, Gesture) + 'static;

    fn bind_button_gesture<F>(ui: &Self::Ui, handler: F)
    where
        F: Fn(usize, Gesture) + 'static;

    fn bind_page_input<F>(ui: &Self::Ui, handler: F)
    where
        F: Fn(PageInput) + 'static;
}

pub type HostEngine<B> =
    DashboardEngine<<B as HostBindings>::Toolkit, ChannelSink, <B as HostBindings>::Device>;

/// Outbound events onto the bounded writer queue. A full queue drops the
/// event.
pub struct ChannelSink {
    tx: SyncSender<DeviceEnvelope>,
    service: String,
    queue_capacity: usize,
    dropped: u64,
}

impl ChannelSink {
    pub fn new(tx: SyncSender<DeviceEnvelope>, service: String, queue_capacity: usize) -> Self {
        Self {
            tx,
            service,
            queue_capacity,
            dropped: 0,
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl EventSink for ChannelSink {
    fn send(&mut self, event: OutboundEvent) {
        match self.tx.try_send(event_envelope(&self.service, event)) {
            Ok(()) => {}
            Err(TrySendError::Full(_envelope)) => {
                self.dropped += 1;
                let dropped = self.dropped;
                if dropped == 1 || dropped.is_power_of_two() {
                    warn!(
                        cap = self.queue_capacity,
                        dropped, "outbound queue full; dropping events"
                    );
                }
            }
            Err(TrySendError::Disconnected(_envelope)) => {
                warn!("outbound queue closed; event dropped");
            }
        }
    }
}

pub fn run<B: HostBindings>() -> Result<(), Box<dyn std::error::Error>> {
    let config = EngineConfig::from_env();
    debug!(?config, "configuration");

    let ui = B::new_ui()?;
    let (tx, rx) = mpsc::sync_channel(config.outbound_queue_cap);
    let (command_tx, command_rx) = mpsc::channel::<ControllerEnvelope>();

    let sink = ChannelSink::new(tx.clone(), config.service.clone(), config.outbound_queue_cap);
    let engine: Rc<RefCell<HostEngine<B>>> = Rc::new(RefCell::new(DashboardEngine::new(
        config.clone(),
        B::toolkit(&ui),
        sink,
        B::device(&ui, &config),
    )));

    install_callbacks::<B>(&ui, &engine);

    let writer_handle = thread::spawn(move || writer_loop(rx));

    tx.send(ready_envelope())
        .map_err(|_| "failed to queue ready envelope")?;
    engine.borrow_mut().start(Instant::now());

    let reader_handle = thread::spawn(move || {
        let read_result = reader_loop(|envelope| {
            if command_tx.send(envelope).is_err() {
                warn!("engine gone; command dropped");
            }
        });

        if let Err(err) = &read_result {
            error!(%err, "reader loop terminated with error");
        }

        let quit_result = slint::invoke_from_event_loop(|| {
            let _ = slint::quit_event_loop();
        });

        if let Err(err) = quit_result {
            error!(%err, "failed to request UI event loop quit");
        }

        read_result
    });

    let pump = slint::Timer::default();
    let pump_engine = Rc::clone(&engine);
    pump.start(slint::TimerMode::Repeated, config.tick, move || {
        let Ok(mut engine) = pump_engine.try_borrow_mut() else {
            return;
        };
        for envelope in command_rx.try_iter() {
            engine.dispatch(envelope);
        }
        engine.tick(Instant::now());
    });

    ui.run()?;

    // Drop UI first so callback closures release their engine clones.
    pump.stop();
    drop(pump);
    drop(ui);
    drop(engine);
    drop(tx);

    if reader_handle.is_finished() {
        match reader_handle.join() {
            Ok(Ok(())) => {}
            Ok(Err(err)) => error!(%err, "reader thread returned error"),
            Err(err) => error!(?err, "reader thread join failed"),
        }
    } else {
        // Avoid hanging process exit on a blocked stdio read during teardown.
        warn!("reader thread still active during shutdown; skipping join");
    }

    if writer_handle.is_finished() {
        match writer_handle.join() {
            Ok(Ok(())) => {}
            Ok(Err(err)) => error!(%err, "writer thread returned error"),
            Err(err) => error!(?err, "writer thread join failed"),
        }
    } else {
        warn!("writer thread still active during shutdown; skipping join");
    }

    Ok(())
}

fn install_callbacks<B: HostBindings>(ui: &B::Ui, engine: &Rc<RefCell<HostEngine<B>>>) {
    let item_engine = Rc::clone(engine);
    B::bind_item_gesture(ui, move |address, gesture| {
        with_engine(&item_engine, |engine| engine.on_item_gesture(address, gesture));
    });

    let button_engine = Rc::clone(engine);
    B::bind_button_gesture(ui, move |index, gesture| {
        with_engine(&button_engine, |engine| engine.press_button(index, gesture));
    });

    let page_engine = Rc::clone(engine);
    B::bind_page_input(ui, move |input| {
        with_engine(&page_engine, |engine| input.deliver(engine));
    });
}

fn with_engine<E>(engine: &RefCell<E>, f: impl FnOnce(&mut E)) {
    match engine.try_borrow_mut() {
        Ok(mut engine) => f(&mut engine),
        Err(_) => warn!("engine busy; input dropped"),
    }
}
