//! Session management
//!
//! The session is the long-lived owner of everything that must survive a
//! surface remount: the emulation buffer, the transport, the reconnect
//! state and the subscriber set. It is created once per run, torn down
//! only by an explicit call, and never implicitly by a surface detach.
//!
//! All mutation happens on the control thread. Transport I/O threads and
//! backoff timers communicate exclusively through the session event
//! channel, and every event carries the attempt generation of the cycle
//! that produced it so leftovers from superseded cycles are ignored.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::{Rc, Weak};
use std::sync::mpsc::Sender;

use thiserror::Error;
use tracing::{debug, info, warn};

use super::buffer::{BindError, EmulationBuffer};
use super::conn::{
    ConnEvent, ConnectionController, ConnectionState, Effect, ReconnectPolicy, ReconnectScheduler,
};
use super::transport::{ws_url, SessionEvent, Transport, TransportError, TransportFactory};
use crate::scroll::{should_autoscroll, ScrollTracker};

/// Grid height before the first fit reports real surface geometry.
const DEFAULT_ROWS: u16 = 24;

/// Sent after injected text to execute it, the terminal's Enter.
const EXECUTE_SENTINEL: &str = "\r";

pub type SurfaceId = u64;

/// A renderable screen region: an identity plus a cell rectangle. The
/// session only remembers which one it is currently rendering into; the
/// region's lifecycle belongs to the UI.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SurfaceHandle {
    pub id: SurfaceId,
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
}

impl SurfaceHandle {
    pub fn rows(&self) -> u16 {
        self.height
    }
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("session is not initialized")]
    NotInitialized,

    #[error("cannot attach surface {surface}: buffer still bound to surface {bound}")]
    SurfaceConflict { surface: SurfaceId, bound: SurfaceId },

    #[error(transparent)]
    Transport(#[from] TransportError),
}

type StatusCallback = Rc<dyn Fn(ConnectionState)>;

/// Status subscriber registry.
///
/// `notify` iterates a snapshot of the entries, so a callback may
/// subscribe or cancel (including itself) without affecting the round in
/// flight.
#[derive(Clone, Default)]
pub struct StatusHub {
    inner: Rc<RefCell<HubInner>>,
}

#[derive(Default)]
struct HubInner {
    next_id: u64,
    entries: Vec<(u64, StatusCallback)>,
}

impl StatusHub {
    pub fn subscribe(&self, callback: impl Fn(ConnectionState) + 'static) -> Subscription {
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.entries.push((id, Rc::new(callback)));
        Subscription {
            id,
            hub: Rc::downgrade(&self.inner),
        }
    }

    pub fn notify(&self, status: ConnectionState) {
        let snapshot: Vec<StatusCallback> = self
            .inner
            .borrow()
            .entries
            .iter()
            .map(|(_, callback)| callback.clone())
            .collect();
        for callback in snapshot {
            callback(status);
        }
    }

    fn clear(&self) {
        self.inner.borrow_mut().entries.clear();
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.borrow().entries.len()
    }
}

/// Handle returned by [`StatusHub::subscribe`]; cancel to stop receiving
/// notifications. Dropping without cancelling leaves the subscription
/// active for the session's lifetime.
pub struct Subscription {
    id: u64,
    hub: Weak<RefCell<HubInner>>,
}

impl Subscription {
    #[allow(dead_code)]
    pub fn cancel(&self) {
        if let Some(inner) = self.hub.upgrade() {
            inner.borrow_mut().entries.retain(|(id, _)| *id != self.id);
        }
    }
}

/// Session tuning, filled from the config file.
#[derive(Clone, Copy, Debug)]
pub struct SessionOptions {
    /// Fixed grid width. Rows track the surface, columns deliberately do
    /// not: wide tabular output crops instead of wrapping.
    pub cols: u16,
    pub scrollback: usize,
    /// Whether fits send a resize notice to the remote process.
    pub send_resize: bool,
    pub policy: ReconnectPolicy,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            cols: 200,
            scrollback: 10000,
            send_resize: false,
            policy: ReconnectPolicy::default(),
        }
    }
}

/// The persistent terminal session.
pub struct Session {
    options: SessionOptions,
    url: String,
    buffer: Option<EmulationBuffer>,
    transport: Option<Box<dyn Transport>>,
    surface: Option<SurfaceHandle>,
    controller: ConnectionController,
    scroll: ScrollTracker,
    hub: StatusHub,
    factory: Box<dyn TransportFactory>,
    scheduler: Box<dyn ReconnectScheduler>,
    events: Sender<SessionEvent>,
    needs_clear: bool,
    torn_down: bool,
}

impl Session {
    pub fn new(
        options: SessionOptions,
        factory: Box<dyn TransportFactory>,
        scheduler: Box<dyn ReconnectScheduler>,
        events: Sender<SessionEvent>,
    ) -> Self {
        let policy = options.policy;
        Self {
            options,
            url: String::new(),
            buffer: None,
            transport: None,
            surface: None,
            controller: ConnectionController::new(policy),
            scroll: ScrollTracker::new(),
            hub: StatusHub::default(),
            factory,
            scheduler,
            events,
            needs_clear: false,
            torn_down: false,
        }
    }

    /// Create the emulation buffer and start the connection cycle.
    /// Idempotent: once a buffer exists this is a no-op.
    pub fn initialize(&mut self, endpoint: &str) -> Result<(), SessionError> {
        if self.buffer.is_some() {
            return Ok(());
        }
        self.url = ws_url(endpoint)?;
        self.buffer = Some(EmulationBuffer::new(
            DEFAULT_ROWS,
            self.options.cols,
            self.options.scrollback,
        ));
        info!("session initialized against {}", self.url);
        let effects = self
            .controller
            .handle(ConnEvent::ConnectRequested { manual: false });
        self.apply(effects);
        Ok(())
    }

    pub fn status(&self) -> ConnectionState {
        self.controller.state()
    }

    pub fn subscribe(&self, callback: impl Fn(ConnectionState) + 'static) -> Subscription {
        self.hub.subscribe(callback)
    }

    /// Record `handle` as the render target and bind the buffer to it.
    ///
    /// Attaching the handle that is already attached is a no-op (geometry
    /// is still refreshed). If the buffer claims to be bound to a
    /// different surface, the stale claim is cleared and the bind retried
    /// exactly once; a second refusal is a caller error.
    pub fn attach_surface(&mut self, handle: SurfaceHandle) -> Result<(), SessionError> {
        if let Some(current) = self.surface {
            if current.id == handle.id {
                self.surface = Some(handle);
                return Ok(());
            }
        }

        let buffer = self.buffer.as_mut().ok_or(SessionError::NotInitialized)?;
        if let Err(BindError::AlreadyBound(bound)) = buffer.bind(handle.id) {
            warn!(
                "surface {} attach found buffer bound to {}, clearing and retrying",
                handle.id, bound
            );
            buffer.release();
            if let Err(BindError::AlreadyBound(bound)) = buffer.bind(handle.id) {
                return Err(SessionError::SurfaceConflict {
                    surface: handle.id,
                    bound,
                });
            }
        }

        self.surface = Some(handle);
        self.needs_clear = true;
        // The surface's size may not be final yet; fit once layout has
        // settled rather than synchronously.
        let _ = self.events.send(SessionEvent::FitRequested);
        Ok(())
    }

    /// Forget the render target. Buffer and transport stay alive, so a
    /// later re-attach resumes with full scrollback.
    pub fn detach_surface(&mut self) {
        self.surface = None;
    }

    #[allow(dead_code)]
    pub fn surface(&self) -> Option<SurfaceHandle> {
        self.surface
    }

    /// Resize the grid to the surface: rows from geometry, columns fixed.
    pub fn fit(&mut self, handle: SurfaceHandle) {
        let Some(buffer) = self.buffer.as_mut() else {
            return;
        };
        let rows = handle.rows().max(1);
        let cols = self.options.cols;
        buffer.resize(rows, cols);
        debug!("fit surface {} to {}x{}", handle.id, cols, rows);

        if self.options.send_resize && self.controller.state() == ConnectionState::Connected {
            if let Some(transport) = self.transport.as_mut() {
                let notice = format!("{{\"type\":\"resize\",\"cols\":{},\"rows\":{}}}", cols, rows);
                let _ = transport.send_text(&notice);
            }
        }

        self.needs_clear = true;
        self.refresh_scroll();
    }

    /// Forward keyboard input. Input typed while not connected is dropped,
    /// never queued: replaying stale keystrokes after a reconnect would
    /// only confuse the remote.
    pub fn send_input(&mut self, bytes: &[u8]) {
        if self.controller.state() != ConnectionState::Connected {
            return;
        }
        if let Some(transport) = self.transport.as_mut() {
            let text = String::from_utf8_lossy(bytes);
            let _ = transport.send_text(&text);
        }
    }

    /// Submit a canned command as if typed, terminated by the execute
    /// sentinel. Exactly two sends when connected, none otherwise.
    pub fn inject_text(&mut self, text: &str) {
        if self.controller.state() != ConnectionState::Connected {
            return;
        }
        if let Some(transport) = self.transport.as_mut() {
            let _ = transport.send_text(text);
            let _ = transport.send_text(EXECUTE_SENTINEL);
        }
    }

    /// Request a fresh connection cycle, resetting the retry budget.
    /// Valid from any state, including terminal `Error`.
    pub fn reconnect(&mut self) {
        let effects = self
            .controller
            .handle(ConnEvent::ConnectRequested { manual: true });
        self.apply(effects);
    }

    /// Process one event from the control channel. Returns whether the
    /// screen may have changed.
    pub fn handle_event(&mut self, event: SessionEvent) -> bool {
        match event {
            SessionEvent::Opened { generation } => {
                if generation != self.controller.generation() {
                    return false;
                }
                let effects = self.controller.handle(ConnEvent::OpenSucceeded);
                self.apply(effects);
                true
            }
            SessionEvent::Data { generation, text } => {
                if generation != self.controller.generation() {
                    return false;
                }
                self.on_data(&text);
                true
            }
            SessionEvent::Closed { generation, reason } => {
                if generation != self.controller.generation() {
                    return false;
                }
                if let Some(reason) = reason {
                    debug!("transport closed: {}", reason);
                }
                if let Some(mut transport) = self.transport.take() {
                    transport.close();
                }
                let effects = self.controller.handle(ConnEvent::TransportClosed);
                self.apply(effects);
                true
            }
            SessionEvent::ReconnectTimer { generation } => {
                let effects = self
                    .controller
                    .handle(ConnEvent::BackoffTimerFired { generation });
                let acted = !effects.is_empty();
                self.apply(effects);
                acted
            }
            SessionEvent::FitRequested => {
                if let Some(handle) = self.surface {
                    self.fit(handle);
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Write an output chunk, deciding the viewport first. The at-bottom
    /// check must happen before the write: afterwards the chunk itself
    /// has extended the scroll range and the answer is meaningless.
    fn on_data(&mut self, text: &str) {
        let Some(buffer) = self.buffer.as_mut() else {
            return;
        };
        let was_at_bottom = self.scroll.is_at_bottom();
        let user_scrolled_up = self.scroll.user_scrolled_up();
        let history_before = buffer.scrollback_len();
        let position_before = buffer.scroll_position();

        buffer.write_chunk(text.as_bytes());

        if should_autoscroll(was_at_bottom, user_scrolled_up) {
            buffer.scroll_to_bottom();
            self.scroll.scroll_to_bottom();
        } else {
            // Hold the viewed history still while lines append below it.
            let added = buffer.scrollback_len().saturating_sub(history_before);
            buffer.set_scroll_position(position_before + added);
        }
        self.refresh_scroll();
    }

    /// Move the viewport by `delta` lines (positive = into history).
    pub fn scroll_lines(&mut self, delta: i32) {
        let Some(buffer) = self.buffer.as_mut() else {
            return;
        };
        let position = buffer.scroll_position() as i64 + delta as i64;
        buffer.set_scroll_position(position.max(0) as usize);
        self.refresh_scroll();
    }

    pub fn scroll_page(&mut self, up: bool) {
        let rows = match self.buffer.as_ref() {
            Some(buffer) => buffer.visible_rows().saturating_sub(1).max(1) as i32,
            None => return,
        };
        self.scroll_lines(if up { rows } else { -rows });
    }

    /// Jump back to the live tail.
    pub fn scroll_to_live(&mut self) {
        let Some(buffer) = self.buffer.as_mut() else {
            return;
        };
        buffer.scroll_to_bottom();
        self.scroll.scroll_to_bottom();
        self.refresh_scroll();
    }

    pub fn screen(&self) -> Option<&vt100::Screen> {
        self.buffer.as_ref().map(|buffer| buffer.screen())
    }

    /// Lines the viewport currently sits above the live tail.
    pub fn scroll_position(&self) -> usize {
        self.buffer
            .as_ref()
            .map(|buffer| buffer.scroll_position())
            .unwrap_or(0)
    }

    /// Whether the render target should be cleared before the next draw.
    pub fn take_needs_clear(&mut self) -> bool {
        std::mem::take(&mut self.needs_clear)
    }

    /// Release transport, timers, buffer and subscribers together. The
    /// session is unusable afterwards.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        if let Some(mut transport) = self.transport.take() {
            transport.close();
        }
        self.controller.shutdown();
        self.buffer = None;
        self.surface = None;
        self.hub.clear();
        info!("session torn down");
    }

    /// Execute controller effects, feeding synchronous open failures back
    /// into the machine until it settles.
    fn apply(&mut self, effects: Vec<Effect>) {
        let mut queue: VecDeque<Effect> = effects.into();
        while let Some(effect) = queue.pop_front() {
            match effect {
                Effect::Notify(status) => self.hub.notify(status),
                Effect::ScheduleReconnect { delay, generation } => {
                    self.scheduler.schedule(delay, generation);
                }
                Effect::OpenTransport { generation } => {
                    // At most one live transport: replace before opening.
                    if let Some(mut old) = self.transport.take() {
                        old.close();
                    }
                    match self.factory.open(&self.url, generation, self.events.clone()) {
                        Ok(transport) => self.transport = Some(transport),
                        Err(e) => {
                            warn!("transport open failed: {}", e);
                            queue.extend(self.controller.handle(ConnEvent::TransportClosed));
                        }
                    }
                }
            }
        }
    }

    fn refresh_scroll(&mut self) {
        if let Some(buffer) = self.buffer.as_mut() {
            let offset = buffer.offset_from_top();
            let total = buffer.total_lines();
            let rows = buffer.visible_rows() as usize;
            self.scroll.on_scroll(offset, total, rows);
        }
    }

    #[cfg(test)]
    fn buffer(&self) -> &EmulationBuffer {
        self.buffer.as_ref().expect("buffer initialized")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::sync::mpsc::{self, Receiver};
    use std::time::Duration;

    #[derive(Default)]
    struct Wire {
        sent: Vec<String>,
        opens: Vec<u64>,
        closes: u32,
        fail_opens: bool,
    }

    struct FakeTransport {
        wire: Rc<RefCell<Wire>>,
    }

    impl Transport for FakeTransport {
        fn send_text(&mut self, text: &str) -> Result<(), TransportError> {
            self.wire.borrow_mut().sent.push(text.to_string());
            Ok(())
        }

        fn close(&mut self) {
            self.wire.borrow_mut().closes += 1;
        }
    }

    struct FakeFactory {
        wire: Rc<RefCell<Wire>>,
    }

    impl TransportFactory for FakeFactory {
        fn open(
            &mut self,
            _url: &str,
            generation: u64,
            _events: Sender<SessionEvent>,
        ) -> Result<Box<dyn Transport>, TransportError> {
            let mut wire = self.wire.borrow_mut();
            wire.opens.push(generation);
            if wire.fail_opens {
                return Err(TransportError::Closed);
            }
            Ok(Box::new(FakeTransport {
                wire: self.wire.clone(),
            }))
        }
    }

    struct FakeScheduler {
        scheduled: Rc<RefCell<Vec<(Duration, u64)>>>,
    }

    impl ReconnectScheduler for FakeScheduler {
        fn schedule(&mut self, delay: Duration, generation: u64) {
            self.scheduled.borrow_mut().push((delay, generation));
        }
    }

    struct Rig {
        session: Session,
        wire: Rc<RefCell<Wire>>,
        scheduled: Rc<RefCell<Vec<(Duration, u64)>>>,
        rx: Receiver<SessionEvent>,
    }

    fn rig_with(options: SessionOptions) -> Rig {
        let wire = Rc::new(RefCell::new(Wire::default()));
        let scheduled = Rc::new(RefCell::new(Vec::new()));
        let (tx, rx) = mpsc::channel();
        let session = Session::new(
            options,
            Box::new(FakeFactory { wire: wire.clone() }),
            Box::new(FakeScheduler {
                scheduled: scheduled.clone(),
            }),
            tx,
        );
        Rig {
            session,
            wire,
            scheduled,
            rx,
        }
    }

    fn rig() -> Rig {
        rig_with(SessionOptions::default())
    }

    fn connected_rig() -> Rig {
        let mut r = rig();
        r.session.initialize("ws://localhost:9000/ws").unwrap();
        let generation = r.session.controller.generation();
        r.session.handle_event(SessionEvent::Opened { generation });
        r
    }

    fn handle(id: SurfaceId, rows: u16) -> SurfaceHandle {
        SurfaceHandle {
            id,
            x: 0,
            y: 0,
            width: 80,
            height: rows,
        }
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let mut r = rig();
        r.session.initialize("ws://localhost:9000/ws").unwrap();
        r.session.initialize("ws://localhost:9000/ws").unwrap();
        assert_eq!(r.wire.borrow().opens.len(), 1);
        assert_eq!(r.session.status(), ConnectionState::Connecting);
    }

    #[test]
    fn test_initialize_rejects_bad_endpoint() {
        let mut r = rig();
        assert!(r.session.initialize("localhost:9000").is_err());
    }

    #[test]
    fn test_inject_text_sends_text_then_sentinel() {
        let mut r = connected_rig();
        r.session.inject_text("ls");
        assert_eq!(
            r.wire.borrow().sent,
            vec!["ls".to_string(), "\r".to_string()]
        );
    }

    #[test]
    fn test_inject_text_ignored_when_not_connected() {
        let mut r = rig();
        r.session.initialize("ws://localhost:9000/ws").unwrap();
        r.session.inject_text("ls");
        assert!(r.wire.borrow().sent.is_empty());
    }

    #[test]
    fn test_input_dropped_while_disconnected() {
        let mut r = rig();
        r.session.initialize("ws://localhost:9000/ws").unwrap();
        r.session.send_input(b"echo hi");
        assert!(r.wire.borrow().sent.is_empty());

        let generation = r.session.controller.generation();
        r.session.handle_event(SessionEvent::Opened { generation });
        r.session.send_input(b"echo hi");
        assert_eq!(r.wire.borrow().sent, vec!["echo hi".to_string()]);
    }

    #[test]
    fn test_attach_twice_binds_once() {
        let mut r = connected_rig();
        r.session.attach_surface(handle(7, 10)).unwrap();
        r.session.attach_surface(handle(7, 10)).unwrap();
        assert_eq!(r.session.buffer().bind_count(), 1);
    }

    #[test]
    fn test_attach_schedules_deferred_fit() {
        let mut r = connected_rig();
        r.session.attach_surface(handle(7, 10)).unwrap();
        // Rows unchanged until the deferred fit is processed.
        assert_eq!(r.session.buffer().screen().size().0, DEFAULT_ROWS);

        let event = r.rx.try_recv().expect("fit scheduled");
        assert!(matches!(event, SessionEvent::FitRequested));
        r.session.handle_event(event);
        assert_eq!(r.session.buffer().screen().size(), (10, 200));
    }

    #[test]
    fn test_detach_then_reattach_keeps_scrollback() {
        let mut r = connected_rig();
        r.session.attach_surface(handle(7, 4)).unwrap();
        let fit = r.rx.try_recv().unwrap();
        r.session.handle_event(fit);

        let generation = r.session.controller.generation();
        for i in 0..20 {
            r.session.handle_event(SessionEvent::Data {
                generation,
                text: format!("line {}\r\n", i),
            });
        }
        let history = r.session.buffer.as_mut().unwrap().scrollback_len();
        assert!(history > 0);

        r.session.detach_surface();
        assert!(r.session.surface().is_none());

        r.session.attach_surface(handle(7, 4)).unwrap();
        assert_eq!(r.session.buffer().bind_count(), 1);
        assert_eq!(r.session.buffer.as_mut().unwrap().scrollback_len(), history);
    }

    #[test]
    fn test_attach_conflict_clears_and_retries() {
        let mut r = connected_rig();
        r.session.attach_surface(handle(1, 10)).unwrap();
        r.session.take_needs_clear();

        r.session.attach_surface(handle(2, 10)).unwrap();
        assert_eq!(r.session.buffer().bound_surface(), Some(2));
        assert!(r.session.take_needs_clear());
    }

    #[test]
    fn test_fit_uses_fixed_cols_and_surface_rows() {
        let mut r = connected_rig();
        r.session.fit(handle(1, 30));
        assert_eq!(r.session.buffer().screen().size(), (30, 200));
        assert!(
            r.wire.borrow().sent.is_empty(),
            "resize notice is off by default"
        );
    }

    #[test]
    fn test_fit_sends_resize_notice_when_enabled() {
        let mut r = rig_with(SessionOptions {
            send_resize: true,
            ..SessionOptions::default()
        });
        r.session.initialize("ws://localhost:9000/ws").unwrap();
        let generation = r.session.controller.generation();
        r.session.handle_event(SessionEvent::Opened { generation });

        r.session.fit(handle(1, 30));
        assert_eq!(
            r.wire.borrow().sent,
            vec!["{\"type\":\"resize\",\"cols\":200,\"rows\":30}".to_string()]
        );
    }

    #[test]
    fn test_stale_transport_events_are_ignored() {
        let mut r = connected_rig();
        let stale = r.session.controller.generation();

        r.session.handle_event(SessionEvent::Closed {
            generation: stale,
            reason: None,
        });
        r.session.reconnect();
        let current = r.session.controller.generation();
        assert_ne!(stale, current);

        assert!(!r.session.handle_event(SessionEvent::Data {
            generation: stale,
            text: "ghost".to_string(),
        }));
        assert!(!r
            .session
            .handle_event(SessionEvent::Opened { generation: stale }));
    }

    #[test]
    fn test_close_schedules_reconnect_and_timer_reopens() {
        let mut r = connected_rig();
        let generation = r.session.controller.generation();
        r.session.handle_event(SessionEvent::Closed {
            generation,
            reason: Some("gone".to_string()),
        });
        assert_eq!(r.session.status(), ConnectionState::Disconnected);
        let (delay, timer_gen) = r.scheduled.borrow()[0];
        assert_eq!(delay, Duration::from_millis(3000));

        r.session.handle_event(SessionEvent::ReconnectTimer {
            generation: timer_gen,
        });
        assert_eq!(r.session.status(), ConnectionState::Connecting);
        assert_eq!(r.wire.borrow().opens.len(), 2);
    }

    #[test]
    fn test_open_failures_exhaust_to_error() {
        let mut r = rig_with(SessionOptions {
            policy: ReconnectPolicy {
                max_attempts: 2,
                ..ReconnectPolicy::default()
            },
            ..SessionOptions::default()
        });
        r.wire.borrow_mut().fail_opens = true;

        let statuses = Rc::new(RefCell::new(Vec::new()));
        let seen = statuses.clone();
        let _sub = r
            .session
            .subscribe(move |status| seen.borrow_mut().push(status));

        r.session.initialize("ws://localhost:9000/ws").unwrap();
        // The initial open failed synchronously; drive the budgeted retries.
        for _ in 0..2 {
            let (_, generation) = *r.scheduled.borrow().last().unwrap();
            r.session
                .handle_event(SessionEvent::ReconnectTimer { generation });
        }

        assert_eq!(r.session.status(), ConnectionState::Error);
        let errors = statuses
            .borrow()
            .iter()
            .filter(|s| **s == ConnectionState::Error)
            .count();
        assert_eq!(errors, 1);

        // Manual reconnect leaves the terminal state.
        r.wire.borrow_mut().fail_opens = false;
        r.session.reconnect();
        assert_eq!(r.session.status(), ConnectionState::Connecting);
    }

    #[test]
    fn test_autoscroll_keeps_tracking_live_tail() {
        let mut r = connected_rig();
        r.session.attach_surface(handle(1, 4)).unwrap();
        let fit = r.rx.try_recv().unwrap();
        r.session.handle_event(fit);

        let generation = r.session.controller.generation();
        for i in 0..30 {
            r.session.handle_event(SessionEvent::Data {
                generation,
                text: format!("line {}\r\n", i),
            });
        }
        assert_eq!(r.session.scroll_position(), 0);
        assert!(r.session.scroll.is_at_bottom());
    }

    #[test]
    fn test_scrolled_up_viewport_is_held_stable() {
        let mut r = connected_rig();
        r.session.attach_surface(handle(1, 4)).unwrap();
        let fit = r.rx.try_recv().unwrap();
        r.session.handle_event(fit);

        let generation = r.session.controller.generation();
        for i in 0..30 {
            r.session.handle_event(SessionEvent::Data {
                generation,
                text: format!("line {}\r\n", i),
            });
        }
        r.session.scroll_lines(10);
        assert!(r.session.scroll.user_scrolled_up());
        let offset_before = r.session.buffer.as_mut().unwrap().offset_from_top();

        for i in 30..40 {
            r.session.handle_event(SessionEvent::Data {
                generation,
                text: format!("line {}\r\n", i),
            });
        }
        // Same history lines in view; the tail grew underneath.
        assert_eq!(
            r.session.buffer.as_mut().unwrap().offset_from_top(),
            offset_before
        );
        assert!(r.session.scroll.user_scrolled_up());

        r.session.scroll_to_live();
        assert_eq!(r.session.scroll_position(), 0);
        assert!(!r.session.scroll.user_scrolled_up());
    }

    #[test]
    fn test_subscriber_snapshot_semantics() {
        let hub = StatusHub::default();
        let calls_a = Rc::new(Cell::new(0));
        let calls_b = Rc::new(Cell::new(0));

        let slot: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));
        let slot_in_callback = slot.clone();
        let a = calls_a.clone();
        let sub_a = hub.subscribe(move |_| {
            a.set(a.get() + 1);
            // Self-unsubscribe mid-round.
            if let Some(sub) = slot_in_callback.borrow().as_ref() {
                sub.cancel();
            }
        });
        *slot.borrow_mut() = Some(sub_a);

        let b = calls_b.clone();
        let _sub_b = hub.subscribe(move |_| b.set(b.get() + 1));

        hub.notify(ConnectionState::Connecting);
        assert_eq!(calls_a.get(), 1);
        assert_eq!(calls_b.get(), 1, "delivery to others is undisturbed");

        hub.notify(ConnectionState::Connected);
        assert_eq!(calls_a.get(), 1, "no further notifications after cancel");
        assert_eq!(calls_b.get(), 2);
    }

    #[test]
    fn test_subscribe_during_notification() {
        let hub = StatusHub::default();
        let late_calls = Rc::new(Cell::new(0));

        let hub_in_callback = hub.clone();
        let late = late_calls.clone();
        let subs: Rc<RefCell<Vec<Subscription>>> = Rc::new(RefCell::new(Vec::new()));
        let keep = subs.clone();
        let _sub = hub.subscribe(move |_| {
            let late = late.clone();
            let sub = hub_in_callback.subscribe(move |_| late.set(late.get() + 1));
            keep.borrow_mut().push(sub);
        });

        hub.notify(ConnectionState::Connecting);
        assert_eq!(late_calls.get(), 0, "added mid-round, not called this round");

        hub.notify(ConnectionState::Connected);
        assert_eq!(late_calls.get(), 1);
    }

    #[test]
    fn test_teardown_releases_everything() {
        let mut r = connected_rig();
        let _sub = r.session.subscribe(|_| {});
        r.session.teardown();

        assert!(r.session.buffer.is_none());
        assert!(r.session.surface().is_none());
        assert_eq!(r.session.hub.len(), 0);
        assert!(r.wire.borrow().closes >= 1);

        // Idempotent.
        r.session.teardown();
        r.session.inject_text("ls");
        assert!(r.wire.borrow().sent.is_empty());
    }

    #[test]
    fn test_status_labels() {
        assert_eq!(ConnectionState::Disconnected.as_str(), "disconnected");
        assert_eq!(ConnectionState::Connecting.as_str(), "connecting");
        assert_eq!(ConnectionState::Connected.as_str(), "connected");
        assert_eq!(ConnectionState::Error.as_str(), "error");
    }
}
