//! Plugin to host callback.
//!
//! Each instance's [`HostContext`] is reachable from the effect descriptor's
//! host-reserved field. Requests made while the entry point is still running
//! (before that field is set) use the context of the load in progress on the
//! calling thread.

use crate::abi::{self, AEffect};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::cell::RefCell;
use std::ffi::{c_char, c_void, CStr};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

/// Identity answered to vendor, product and version queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostIdentity {
    pub vendor: String,
    pub product: String,
    pub version: i32,
}

impl Default for HostIdentity {
    fn default() -> Self {
        Self {
            vendor: "ostinato".to_string(),
            product: "ostinato-host".to_string(),
            version: 1,
        }
    }
}

/// Something the plugin told the host.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HostNotification {
    /// A parameter changed from the plugin side (usually its editor).
    Automation { index: i32, value: f32 },
    BeginEdit(i32),
    EndEdit(i32),
    /// Channel counts or latency changed.
    IoChanged,
    UpdateDisplay,
    /// The plugin sent events to the host.
    PluginEvents { count: usize },
}

/// Receiver of [`HostNotification`]s. Called on whatever thread the plugin
/// calls back from, including the audio thread, so it must not block.
pub trait HostEventHandler: Send + Sync {
    /// Returns `true` if the notification was consumed.
    fn handle(&self, notification: HostNotification) -> bool;
}

/// Handler that forwards into a bounded channel, dropping when full.
#[derive(Clone)]
pub struct ChannelHostHandler {
    tx: Sender<HostNotification>,
}

impl HostEventHandler for ChannelHostHandler {
    fn handle(&self, notification: HostNotification) -> bool {
        self.tx.try_send(notification).is_ok()
    }
}

/// Create a [`ChannelHostHandler`] and the receiving end of its channel.
pub fn notification_channel(
    capacity: usize,
) -> (ChannelHostHandler, Receiver<HostNotification>) {
    let (tx, rx) = bounded(capacity.max(1));
    (ChannelHostHandler { tx }, rx)
}

/// Handler that consumes nothing.
pub struct IgnoreNotifications;

impl HostEventHandler for IgnoreNotifications {
    fn handle(&self, _notification: HostNotification) -> bool {
        false
    }
}

/// Per-instance state answered from host callbacks.
pub struct HostContext {
    identity: HostIdentity,
    handler: Arc<dyn HostEventHandler>,
    sample_rate: AtomicU32,
    block_size: AtomicUsize,
}

impl HostContext {
    pub fn new(identity: HostIdentity, handler: Arc<dyn HostEventHandler>) -> Self {
        Self {
            identity,
            handler,
            sample_rate: AtomicU32::new(44100.0f32.to_bits()),
            block_size: AtomicUsize::new(512),
        }
    }

    pub fn identity(&self) -> &HostIdentity {
        &self.identity
    }

    pub(crate) fn set_sample_rate(&self, rate: f32) {
        self.sample_rate.store(rate.to_bits(), Ordering::Relaxed);
    }

    pub(crate) fn set_block_size(&self, frames: usize) {
        self.block_size.store(frames, Ordering::Relaxed);
    }

    fn sample_rate(&self) -> f32 {
        f32::from_bits(self.sample_rate.load(Ordering::Relaxed))
    }

    fn block_size(&self) -> usize {
        self.block_size.load(Ordering::Relaxed)
    }

    fn notify(&self, notification: HostNotification) -> bool {
        self.handler.handle(notification)
    }
}

thread_local! {
    static LOADING: RefCell<Option<Arc<HostContext>>> = const { RefCell::new(None) };
}

/// Run `f` with `context` answering callbacks from not-yet-bound effects on
/// this thread.
pub(crate) fn with_loading_context<R>(context: Arc<HostContext>, f: impl FnOnce() -> R) -> R {
    struct Reset;
    impl Drop for Reset {
        fn drop(&mut self) {
            LOADING.with(|slot| slot.borrow_mut().take());
        }
    }

    LOADING.with(|slot| *slot.borrow_mut() = Some(context));
    let _reset = Reset;
    f()
}

/// A decoded host callback.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum HostRequest<'a> {
    Automate { index: i32, value: f32 },
    Version,
    CurrentId,
    Idle,
    WantMidi,
    GetTime,
    ProcessEvents { count: usize },
    IoChanged,
    SizeWindow { width: i32, height: isize },
    SampleRate,
    BlockSize,
    ProcessLevel,
    VendorString,
    ProductString,
    VendorVersion,
    CanDo(&'a str),
    UpdateDisplay,
    BeginEdit(i32),
    EndEdit(i32),
    Unknown(i32),
}

impl<'a> HostRequest<'a> {
    /// Decode one callback.
    ///
    /// # Safety
    ///
    /// For process-events and can-do requests `ptr` must be null or point
    /// to what the protocol says (an event list, a C string).
    unsafe fn decode(opcode: i32, index: i32, value: isize, ptr: *mut c_void, opt: f32) -> Self {
        match opcode {
            abi::host::AUTOMATE => HostRequest::Automate { index, value: opt },
            abi::host::VERSION => HostRequest::Version,
            abi::host::CURRENT_ID => HostRequest::CurrentId,
            abi::host::IDLE => HostRequest::Idle,
            abi::host::WANT_MIDI => HostRequest::WantMidi,
            abi::host::GET_TIME => HostRequest::GetTime,
            abi::host::PROCESS_EVENTS => {
                let count = if ptr.is_null() {
                    0
                } else {
                    (*(ptr as *const vst::api::Events)).num_events.max(0) as usize
                };
                HostRequest::ProcessEvents { count }
            }
            abi::host::IO_CHANGED => HostRequest::IoChanged,
            abi::host::SIZE_WINDOW => HostRequest::SizeWindow { width: index, height: value },
            abi::host::GET_SAMPLE_RATE => HostRequest::SampleRate,
            abi::host::GET_BLOCK_SIZE => HostRequest::BlockSize,
            abi::host::GET_CURRENT_PROCESS_LEVEL => HostRequest::ProcessLevel,
            abi::host::GET_VENDOR_STRING => HostRequest::VendorString,
            abi::host::GET_PRODUCT_STRING => HostRequest::ProductString,
            abi::host::GET_VENDOR_VERSION => HostRequest::VendorVersion,
            abi::host::CAN_DO => {
                let query = if ptr.is_null() {
                    ""
                } else {
                    CStr::from_ptr(ptr as *const c_char).to_str().unwrap_or("")
                };
                HostRequest::CanDo(query)
            }
            abi::host::UPDATE_DISPLAY => HostRequest::UpdateDisplay,
            abi::host::BEGIN_EDIT => HostRequest::BeginEdit(index),
            abi::host::END_EDIT => HostRequest::EndEdit(index),
            other => HostRequest::Unknown(other),
        }
    }
}

/// Can-do strings the host answers `1` to.
const HOST_CAN_DO: [&str; 4] = [
    "sendVstEvents",
    "sendVstMidiEvent",
    "receiveVstEvents",
    "receiveVstMidiEvent",
];

/// Answer a decoded request. `bound` is false while the entry point runs.
fn answer(request: &HostRequest<'_>, context: &HostContext, bound: bool, ptr: *mut c_void) -> isize {
    match *request {
        HostRequest::Version => abi::VST_VERSION,
        HostRequest::ProcessLevel => abi::PROCESS_LEVEL_REALTIME,
        HostRequest::VendorString => {
            // SAFETY: the protocol gives a buffer of MAX_VENDOR_STR_LEN bytes
            unsafe { copy_c_string(&context.identity.vendor, ptr) }
        }
        HostRequest::ProductString => {
            // SAFETY: as above
            unsafe { copy_c_string(&context.identity.product, ptr) }
        }
        HostRequest::VendorVersion => context.identity.version as isize,
        HostRequest::SampleRate => context.sample_rate() as isize,
        HostRequest::BlockSize => context.block_size() as isize,
        HostRequest::CanDo(query) => {
            let supported = HOST_CAN_DO.contains(&query);
            debug!(query, supported, "plugin can-do query");
            supported as isize
        }
        HostRequest::Automate { index, value } if bound => {
            context.notify(HostNotification::Automation { index, value });
            0
        }
        HostRequest::BeginEdit(index) if bound => {
            debug!(index, "plugin begin edit");
            context.notify(HostNotification::BeginEdit(index)) as isize
        }
        HostRequest::EndEdit(index) if bound => {
            debug!(index, "plugin end edit");
            context.notify(HostNotification::EndEdit(index)) as isize
        }
        HostRequest::IoChanged if bound => context.notify(HostNotification::IoChanged) as isize,
        HostRequest::UpdateDisplay => {
            debug!("plugin requested display update");
            context.notify(HostNotification::UpdateDisplay);
            1
        }
        HostRequest::ProcessEvents { count } if bound => {
            trace!(count, "plugin sent events");
            context.notify(HostNotification::PluginEvents { count }) as isize
        }
        HostRequest::Idle | HostRequest::WantMidi | HostRequest::GetTime | HostRequest::CurrentId => 0,
        ref other => {
            debug!(request = ?other, bound, "unhandled host request");
            0
        }
    }
}

/// Write `value` as a NUL-terminated string of at most
/// `MAX_VENDOR_STR_LEN` bytes into `dst`. Returns 1 on success.
unsafe fn copy_c_string(value: &str, dst: *mut c_void) -> isize {
    if dst.is_null() {
        return 0;
    }
    let bytes = value.as_bytes();
    let len = bytes.len().min(abi::MAX_VENDOR_STR_LEN - 1);
    let dst = dst as *mut u8;
    std::ptr::copy_nonoverlapping(bytes.as_ptr(), dst, len);
    *dst.add(len) = 0;
    1
}

/// Host callback handed to every plugin entry point.
pub(crate) extern "C" fn host_callback(
    effect: *mut AEffect,
    opcode: i32,
    index: i32,
    value: isize,
    ptr: *mut c_void,
    opt: f32,
) -> isize {
    // SAFETY: pointer arguments come from the plugin and follow the protocol
    // for `opcode`.
    let request = unsafe { HostRequest::decode(opcode, index, value, ptr, opt) };

    // SAFETY: a non-zero reserved field was set by `Vst2Plugin` to the
    // address of an `Arc<HostContext>` that outlives the effect.
    let bound = unsafe { effect.as_ref().map_or(0, |e| e.reserved1) };
    if bound != 0 {
        let context = unsafe { &*(bound as *const HostContext) };
        return answer(&request, context, true, ptr);
    }

    LOADING.with(|slot| match slot.borrow().as_deref() {
        Some(context) => answer(&request, context, false, ptr),
        None => match request {
            HostRequest::Version => abi::VST_VERSION,
            _ => {
                debug!(opcode, "host request without context");
                0
            }
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ptr;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording(Mutex<Vec<HostNotification>>);

    impl HostEventHandler for Recording {
        fn handle(&self, notification: HostNotification) -> bool {
            self.0.lock().unwrap().push(notification);
            true
        }
    }

    fn context() -> (Arc<HostContext>, Arc<Recording>) {
        let recording = Arc::new(Recording::default());
        let identity = HostIdentity {
            vendor: "Acme Audio".into(),
            product: "Test Host".into(),
            version: 7,
        };
        (Arc::new(HostContext::new(identity, recording.clone())), recording)
    }

    fn call(context: &HostContext, opcode: i32, index: i32, ptr: *mut c_void, opt: f32) -> isize {
        let request = unsafe { HostRequest::decode(opcode, index, 0, ptr, opt) };
        answer(&request, context, true, ptr)
    }

    #[test]
    fn test_version_and_process_level() {
        let (context, _) = context();
        assert_eq!(call(&context, abi::host::VERSION, 0, ptr::null_mut(), 0.0), 2400);
        assert_eq!(call(&context, abi::host::GET_CURRENT_PROCESS_LEVEL, 0, ptr::null_mut(), 0.0), 2);
        assert_eq!(call(&context, abi::host::GET_VENDOR_VERSION, 0, ptr::null_mut(), 0.0), 7);
    }

    #[test]
    fn test_vendor_and_product_strings() {
        let (context, _) = context();
        let mut buffer = [0xFFu8; abi::MAX_VENDOR_STR_LEN];
        let ret = call(&context, abi::host::GET_VENDOR_STRING, 0, buffer.as_mut_ptr() as *mut c_void, 0.0);
        assert_eq!(ret, 1);
        let vendor = CStr::from_bytes_until_nul(&buffer).unwrap();
        assert_eq!(vendor.to_str().unwrap(), "Acme Audio");

        call(&context, abi::host::GET_PRODUCT_STRING, 0, buffer.as_mut_ptr() as *mut c_void, 0.0);
        let product = CStr::from_bytes_until_nul(&buffer).unwrap();
        assert_eq!(product.to_str().unwrap(), "Test Host");

        assert_eq!(call(&context, abi::host::GET_VENDOR_STRING, 0, ptr::null_mut(), 0.0), 0);
    }

    #[test]
    fn test_long_vendor_string_truncated() {
        let identity = HostIdentity {
            vendor: "v".repeat(200),
            ..HostIdentity::default()
        };
        let context = HostContext::new(identity, Arc::new(IgnoreNotifications));
        let mut buffer = [0xFFu8; abi::MAX_VENDOR_STR_LEN];
        call(&context, abi::host::GET_VENDOR_STRING, 0, buffer.as_mut_ptr() as *mut c_void, 0.0);
        assert_eq!(buffer[abi::MAX_VENDOR_STR_LEN - 1], 0);
        assert_eq!(buffer[abi::MAX_VENDOR_STR_LEN - 2], b'v');
    }

    #[test]
    fn test_can_do_queries() {
        let (context, _) = context();
        let yes = b"receiveVstMidiEvent\0";
        let no = b"offline\0";
        assert_eq!(call(&context, abi::host::CAN_DO, 0, yes.as_ptr() as *mut c_void, 0.0), 1);
        assert_eq!(call(&context, abi::host::CAN_DO, 0, no.as_ptr() as *mut c_void, 0.0), 0);
        assert_eq!(call(&context, abi::host::CAN_DO, 0, ptr::null_mut(), 0.0), 0);
    }

    #[test]
    fn test_notifications_forwarded() {
        let (context, recording) = context();
        call(&context, abi::host::AUTOMATE, 3, ptr::null_mut(), 0.75);
        assert_eq!(call(&context, abi::host::BEGIN_EDIT, 3, ptr::null_mut(), 0.0), 1);
        call(&context, abi::host::END_EDIT, 3, ptr::null_mut(), 0.0);
        assert_eq!(call(&context, abi::host::UPDATE_DISPLAY, 0, ptr::null_mut(), 0.0), 1);

        let seen = recording.0.lock().unwrap();
        assert_eq!(
            *seen,
            vec![
                HostNotification::Automation { index: 3, value: 0.75 },
                HostNotification::BeginEdit(3),
                HostNotification::EndEdit(3),
                HostNotification::UpdateDisplay,
            ]
        );
    }

    #[test]
    fn test_unknown_opcode_answers_zero() {
        let (context, recording) = context();
        assert_eq!(call(&context, 9999, 0, ptr::null_mut(), 0.0), 0);
        assert!(recording.0.lock().unwrap().is_empty());
    }

    #[test]
    fn test_sample_rate_and_block_size_follow_context() {
        let (context, _) = context();
        context.set_sample_rate(96000.0);
        context.set_block_size(128);
        assert_eq!(call(&context, abi::host::GET_SAMPLE_RATE, 0, ptr::null_mut(), 0.0), 96000);
        assert_eq!(call(&context, abi::host::GET_BLOCK_SIZE, 0, ptr::null_mut(), 0.0), 128);
    }

    #[test]
    fn test_unbound_callback_uses_loading_context() {
        let (context, recording) = context();
        let mut buffer = [0u8; abi::MAX_VENDOR_STR_LEN];
        let ret = with_loading_context(context, || {
            // Automation before the instance is bound is ignored
            host_callback(ptr::null_mut(), abi::host::AUTOMATE, 0, 0, ptr::null_mut(), 1.0);
            host_callback(
                ptr::null_mut(),
                abi::host::GET_PRODUCT_STRING,
                0,
                0,
                buffer.as_mut_ptr() as *mut c_void,
                0.0,
            )
        });
        assert_eq!(ret, 1);
        assert_eq!(CStr::from_bytes_until_nul(&buffer).unwrap().to_str().unwrap(), "Test Host");
        assert!(recording.0.lock().unwrap().is_empty());

        // Outside a load only the version is answered
        assert_eq!(host_callback(ptr::null_mut(), abi::host::VERSION, 0, 0, ptr::null_mut(), 0.0), 2400);
        assert_eq!(
            host_callback(ptr::null_mut(), abi::host::GET_PRODUCT_STRING, 0, 0, buffer.as_mut_ptr() as *mut c_void, 0.0),
            0
        );
    }

    #[test]
    fn test_channel_handler_drops_when_full() {
        let (handler, rx) = notification_channel(1);
        assert!(handler.handle(HostNotification::IoChanged));
        assert!(!handler.handle(HostNotification::UpdateDisplay));
        assert_eq!(rx.try_recv().unwrap(), HostNotification::IoChanged);
    }
}
