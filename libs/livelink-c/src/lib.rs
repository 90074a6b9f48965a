// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

// FFI cdylib: all public functions are unsafe extern "C" called from C hosts.
#![allow(clippy::missing_safety_doc)]

//! C ABI for the live-link provider.
//!
//! Entry points are prefixed with `ll_` and declared in `include/livelink.h`.
//! Providers are addressed by `u64` handles from a generation-tagged table,
//! subjects by the `u32` ids their provider hands out. Every entry point
//! returns an [`LlStatus`] code and never unwinds into the caller.

pub mod config;
pub mod handle_table;
pub mod status;
pub mod types;

use std::ffi::{CStr, c_char, c_void};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::ptr::NonNull;
use std::sync::{Arc, LazyLock};

use livelink::types::LIVELINK_API_VERSION;
use livelink::{
    FrameInput, LiveLinkError, ProviderConfig, ProviderSession, Result, RoleValues, SubjectId,
    SubjectSchema,
};
use parking_lot::RwLock;

pub use config::FacadeConfig;
pub use handle_table::HandleTable;
pub use status::*;
pub use types::*;

/// Called on the provider's worker thread for every connection change.
pub type LlConnectionCallback =
    Option<unsafe extern "C" fn(handle: u64, event: LlConnectionEvent, user_data: *mut c_void)>;

static PROVIDERS: LazyLock<RwLock<HandleTable<Arc<ProviderSession>>>> = LazyLock::new(|| {
    let config = FacadeConfig::from_env();
    tracing::debug!(max_providers = config.max_providers, "provider table created");
    RwLock::new(HandleTable::with_capacity(config.max_providers))
});

// ============================================================================
// Helpers
// ============================================================================

/// Run an entry point body, mapping errors and panics to status codes.
fn guard(entry: &'static str, body: impl FnOnce() -> Result<i32>) -> i32 {
    match catch_unwind(AssertUnwindSafe(|| {
        livelink::init_logging();
        body()
    })) {
        Ok(Ok(status)) => status,
        Ok(Err(e)) => {
            let status = LlStatus::from(&e);
            match status {
                LlStatus::NotConnected => tracing::trace!(entry, "{}", e),
                LlStatus::TransportError | LlStatus::OutOfResources => {
                    tracing::warn!(entry, "{}", e)
                }
                _ => tracing::debug!(entry, "{}", e),
            }
            status as i32
        }
        Err(_) => {
            tracing::error!(entry, "panic caught at the C boundary");
            LL_INTERNAL
        }
    }
}

unsafe fn str_arg<'a>(ptr: *const c_char, what: &str) -> Result<&'a str> {
    if ptr.is_null() {
        return Err(LiveLinkError::InvalidArgument(format!("{what} is null")));
    }
    unsafe { CStr::from_ptr(ptr) }
        .to_str()
        .map_err(|_| LiveLinkError::InvalidArgument(format!("{what} is not valid UTF-8")))
}

/// `len` elements at `ptr`. A zero length accepts a null pointer.
pub(crate) unsafe fn slice_arg<'a, T>(ptr: *const T, len: u32, what: &str) -> Result<&'a [T]> {
    if len == 0 {
        return Ok(&[]);
    }
    if ptr.is_null() {
        return Err(LiveLinkError::InvalidArgument(format!(
            "{what} is null with length {len}"
        )));
    }
    Ok(unsafe { std::slice::from_raw_parts(ptr, len as usize) })
}

unsafe fn ref_arg<'a, T>(ptr: *const T, what: &str) -> Result<&'a T> {
    unsafe { ptr.as_ref() }.ok_or_else(|| LiveLinkError::InvalidArgument(format!("{what} is null")))
}

fn out_arg<T>(ptr: *mut T, what: &str) -> Result<NonNull<T>> {
    NonNull::new(ptr).ok_or_else(|| LiveLinkError::InvalidArgument(format!("{what} is null")))
}

unsafe fn property_names(names: *const *const c_char, count: u32) -> Result<Vec<String>> {
    let names = unsafe { slice_arg(names, count, "property_names")? };
    names
        .iter()
        .map(|&name| unsafe { str_arg(name, "property name") }.map(str::to_owned))
        .collect()
}

fn provider(handle: u64) -> Result<Arc<ProviderSession>> {
    PROVIDERS
        .read()
        .get(handle)
        .cloned()
        .ok_or_else(|| LiveLinkError::InvalidHandle(format!("provider handle {handle:#x}")))
}

fn create(name: &str, config: ProviderConfig) -> Result<u64> {
    {
        let table = PROVIDERS.read();
        if table.len() >= table.capacity() {
            return Err(LiveLinkError::OutOfResources(format!(
                "provider table is full ({} handles)",
                table.capacity()
            )));
        }
    }

    let session = ProviderSession::create(name, config)?;
    let inserted = PROVIDERS.write().insert(Arc::clone(&session));
    match inserted {
        Ok(handle) => {
            tracing::info!(provider = name, handle, "provider created");
            Ok(handle)
        }
        Err(full) => {
            session.destroy();
            Err(LiveLinkError::OutOfResources(format!(
                "provider table is full ({} handles)",
                full.capacity
            )))
        }
    }
}

fn register(
    handle: u64,
    name: &str,
    schema: SubjectSchema,
    replace: bool,
) -> Result<SubjectId> {
    let provider = provider(handle)?;
    if !replace {
        return provider.register_subject(name, schema);
    }
    match provider.lookup_subject(name) {
        Ok(id) => {
            if provider.subject_schema(id)? == schema {
                return Ok(id);
            }
            provider.update_subject_schema(name, schema)
        }
        Err(LiveLinkError::NotFound(_)) => provider.register_subject(name, schema),
        Err(e) => Err(e),
    }
}

#[allow(clippy::too_many_arguments)]
unsafe fn push(
    handle: u64,
    subject: u32,
    world_time: f64,
    transforms: &[LlTransform],
    properties: *const f32,
    property_count: u32,
    metadata: *const LlMetadata,
    role_values: RoleValues,
) -> Result<i32> {
    let provider = provider(handle)?;
    let properties = unsafe { slice_arg(properties, property_count, "properties")? };
    let metadata = match unsafe { metadata.as_ref() } {
        Some(metadata) => Some(unsafe { metadata.to_input()? }),
        None => None,
    };

    let input = FrameInput {
        world_time,
        transforms,
        properties,
        metadata,
        role_values,
    };
    let outcome = provider.push_frame(SubjectId::from_raw(subject), &input)?;
    if outcome.dropped > 0 {
        tracing::trace!(subject, dropped = outcome.dropped, "outbound mailbox full, oldest frame dropped");
    }
    Ok(LL_OK)
}

// ============================================================================
// C ABI: Library
// ============================================================================

/// Wire protocol version spoken by this library.
#[unsafe(no_mangle)]
pub extern "C" fn ll_get_version() -> i32 {
    LIVELINK_API_VERSION
}

/// Static, NUL-terminated description of a status code.
#[unsafe(no_mangle)]
pub extern "C" fn ll_status_message(status: i32) -> *const c_char {
    match LlStatus::from_raw(status) {
        Some(status) => status.message().as_ptr(),
        None => c"unknown status".as_ptr(),
    }
}

// ============================================================================
// C ABI: Provider lifecycle
// ============================================================================

/// Create a provider configured from the file named by `LIVELINK_CONFIG`
/// (defaults when unset).
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ll_provider_create(name: *const c_char, out_handle: *mut u64) -> i32 {
    guard("ll_provider_create", || {
        let out = out_arg(out_handle, "out_handle")?;
        let name = unsafe { str_arg(name, "provider name")? };
        let handle = create(name, ProviderConfig::from_env()?)?;
        unsafe { out.write(handle) };
        Ok(LL_OK)
    })
}

/// Create a provider from YAML configuration text.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ll_provider_create_with_config(
    name: *const c_char,
    config_yaml: *const c_char,
    out_handle: *mut u64,
) -> i32 {
    guard("ll_provider_create_with_config", || {
        let out = out_arg(out_handle, "out_handle")?;
        let name = unsafe { str_arg(name, "provider name")? };
        let yaml = unsafe { str_arg(config_yaml, "config_yaml")? };
        let handle = create(name, ProviderConfig::from_yaml_str(yaml)?)?;
        unsafe { out.write(handle) };
        Ok(LL_OK)
    })
}

/// Destroy a provider. Unknown and already destroyed handles are a no-op.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ll_provider_destroy(handle: u64) -> i32 {
    guard("ll_provider_destroy", || {
        let removed = PROVIDERS.write().remove(handle);
        match removed {
            Some(provider) => {
                provider.destroy();
                tracing::info!(provider = provider.name(), handle, "provider destroyed");
            }
            None => tracing::debug!(handle, "destroy of unknown handle ignored"),
        }
        Ok(LL_OK)
    })
}

// ============================================================================
// C ABI: Subjects
// ============================================================================

/// Register a subject carrying only properties. With `replace`, an existing
/// subject of that name gets the new schema and a new id.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ll_subject_register_basic(
    handle: u64,
    name: *const c_char,
    property_names: *const *const c_char,
    property_count: u32,
    replace: u8,
    out_subject: *mut u32,
) -> i32 {
    guard("ll_subject_register_basic", || {
        let out = out_arg(out_subject, "out_subject")?;
        let name = unsafe { str_arg(name, "subject name")? };
        let properties = unsafe { self::property_names(property_names, property_count)? };
        let id = register(handle, name, SubjectSchema::basic(properties), replace != 0)?;
        unsafe { out.write(id.raw()) };
        Ok(LL_OK)
    })
}

/// Register a single-transform subject.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ll_subject_register_transform(
    handle: u64,
    name: *const c_char,
    property_names: *const *const c_char,
    property_count: u32,
    replace: u8,
    out_subject: *mut u32,
) -> i32 {
    guard("ll_subject_register_transform", || {
        let out = out_arg(out_subject, "out_subject")?;
        let name = unsafe { str_arg(name, "subject name")? };
        let properties = unsafe { self::property_names(property_names, property_count)? };
        let id = register(handle, name, SubjectSchema::transform(properties), replace != 0)?;
        unsafe { out.write(id.raw()) };
        Ok(LL_OK)
    })
}

/// Register a skeleton. Frames for it carry one transform per bone.
#[allow(clippy::too_many_arguments)]
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ll_subject_register_animation(
    handle: u64,
    name: *const c_char,
    property_names: *const *const c_char,
    property_count: u32,
    bones: *const LlBone,
    bone_count: u32,
    replace: u8,
    out_subject: *mut u32,
) -> i32 {
    guard("ll_subject_register_animation", || {
        let out = out_arg(out_subject, "out_subject")?;
        let name = unsafe { str_arg(name, "subject name")? };
        let properties = unsafe { self::property_names(property_names, property_count)? };
        let bones = unsafe { slice_arg(bones, bone_count, "bones")? }
            .iter()
            .map(LlBone::to_bone)
            .collect::<Result<Vec<_>>>()?;
        let id = register(handle, name, SubjectSchema::animation(bones, properties), replace != 0)?;
        unsafe { out.write(id.raw()) };
        Ok(LL_OK)
    })
}

#[allow(clippy::too_many_arguments)]
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ll_subject_register_camera(
    handle: u64,
    name: *const c_char,
    property_names: *const *const c_char,
    property_count: u32,
    camera: *const LlCameraStatic,
    replace: u8,
    out_subject: *mut u32,
) -> i32 {
    guard("ll_subject_register_camera", || {
        let out = out_arg(out_subject, "out_subject")?;
        let name = unsafe { str_arg(name, "subject name")? };
        let properties = unsafe { self::property_names(property_names, property_count)? };
        let camera = unsafe { ref_arg(camera, "camera")? };
        let schema = SubjectSchema::camera(camera.into(), properties);
        let id = register(handle, name, schema, replace != 0)?;
        unsafe { out.write(id.raw()) };
        Ok(LL_OK)
    })
}

#[allow(clippy::too_many_arguments)]
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ll_subject_register_light(
    handle: u64,
    name: *const c_char,
    property_names: *const *const c_char,
    property_count: u32,
    light: *const LlLightStatic,
    replace: u8,
    out_subject: *mut u32,
) -> i32 {
    guard("ll_subject_register_light", || {
        let out = out_arg(out_subject, "out_subject")?;
        let name = unsafe { str_arg(name, "subject name")? };
        let properties = unsafe { self::property_names(property_names, property_count)? };
        let light = unsafe { ref_arg(light, "light")? };
        let schema = SubjectSchema::light(light.into(), properties);
        let id = register(handle, name, schema, replace != 0)?;
        unsafe { out.write(id.raw()) };
        Ok(LL_OK)
    })
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn ll_subject_unregister(handle: u64, subject: u32) -> i32 {
    guard("ll_subject_unregister", || {
        provider(handle)?.unregister_subject(SubjectId::from_raw(subject))?;
        Ok(LL_OK)
    })
}

/// Current id of the subject called `name`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ll_subject_lookup(
    handle: u64,
    name: *const c_char,
    out_subject: *mut u32,
) -> i32 {
    guard("ll_subject_lookup", || {
        let out = out_arg(out_subject, "out_subject")?;
        let name = unsafe { str_arg(name, "subject name")? };
        let id = provider(handle)?.lookup_subject(name)?;
        unsafe { out.write(id.raw()) };
        Ok(LL_OK)
    })
}

// ============================================================================
// C ABI: Frames
// ============================================================================

/// Push one frame for a basic, transform or animation subject.
///
/// `metadata` may be null. Returns `LL_NOT_CONNECTED` (frame dropped) while
/// no engine is connected.
#[allow(clippy::too_many_arguments)]
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ll_push_frame(
    handle: u64,
    subject: u32,
    world_time: f64,
    transforms: *const LlTransform,
    transform_count: u32,
    properties: *const f32,
    property_count: u32,
    metadata: *const LlMetadata,
) -> i32 {
    guard("ll_push_frame", || unsafe {
        let transforms = slice_arg(transforms, transform_count, "transforms")?;
        push(
            handle,
            subject,
            world_time,
            transforms,
            properties,
            property_count,
            metadata,
            RoleValues::None,
        )
    })
}

#[allow(clippy::too_many_arguments)]
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ll_push_camera_frame(
    handle: u64,
    subject: u32,
    world_time: f64,
    transform: *const LlTransform,
    properties: *const f32,
    property_count: u32,
    metadata: *const LlMetadata,
    camera: *const LlCamera,
) -> i32 {
    guard("ll_push_camera_frame", || unsafe {
        let transform = ref_arg(transform, "transform")?;
        let camera = ref_arg(camera, "camera")?.to_frame_data()?;
        push(
            handle,
            subject,
            world_time,
            std::slice::from_ref(transform),
            properties,
            property_count,
            metadata,
            RoleValues::Camera(camera),
        )
    })
}

#[allow(clippy::too_many_arguments)]
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ll_push_light_frame(
    handle: u64,
    subject: u32,
    world_time: f64,
    transform: *const LlTransform,
    properties: *const f32,
    property_count: u32,
    metadata: *const LlMetadata,
    light: *const LlLight,
) -> i32 {
    guard("ll_push_light_frame", || unsafe {
        let transform = ref_arg(transform, "transform")?;
        let light = ref_arg(light, "light")?;
        push(
            handle,
            subject,
            world_time,
            std::slice::from_ref(transform),
            properties,
            property_count,
            metadata,
            RoleValues::Light(light.into()),
        )
    })
}

// ============================================================================
// C ABI: Connection
// ============================================================================

#[unsafe(no_mangle)]
pub unsafe extern "C" fn ll_connection_state(handle: u64, out_state: *mut i32) -> i32 {
    guard("ll_connection_state", || {
        let out = out_arg(out_state, "out_state")?;
        let state = provider(handle)?.connection_state();
        unsafe { out.write(state as i32) };
        Ok(LL_OK)
    })
}

/// `true` while at least one engine is connected. Invalid handles report
/// `false`.
#[unsafe(no_mangle)]
pub extern "C" fn ll_has_connection(handle: u64) -> bool {
    catch_unwind(|| provider(handle).is_ok_and(|provider| provider.is_connected())).unwrap_or(false)
}

/// Pop the oldest undelivered connection event. Returns `LL_NO_EVENT` when
/// there is none.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ll_poll_connection_event(
    handle: u64,
    out_event: *mut LlConnectionEvent,
) -> i32 {
    guard("ll_poll_connection_event", || {
        let out = out_arg(out_event, "out_event")?;
        match provider(handle)?.poll_event() {
            Some(event) => {
                unsafe { out.write(event.into()) };
                Ok(LL_OK)
            }
            None => Ok(LL_NO_EVENT),
        }
    })
}

/// Opaque caller pointer handed back to the callback untouched.
struct UserData(*mut c_void);

// SAFETY: the library never dereferences the pointer; thread safety of
// what it points at is the caller's contract.
unsafe impl Send for UserData {}
unsafe impl Sync for UserData {}

impl UserData {
    fn as_ptr(&self) -> *mut c_void {
        self.0
    }
}

/// Install (or with a null `callback`, remove) the connection callback.
///
/// The callback runs on the provider's worker thread. It may call back into
/// the library, including `ll_provider_destroy` for its own handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ll_register_connection_callback(
    handle: u64,
    callback: LlConnectionCallback,
    user_data: *mut c_void,
) -> i32 {
    guard("ll_register_connection_callback", || {
        let provider = provider(handle)?;
        match callback {
            Some(callback) => {
                let user_data = UserData(user_data);
                provider.on_connection_change(move |event| unsafe {
                    callback(handle, event.into(), user_data.as_ptr())
                });
            }
            None => provider.clear_connection_callback(),
        }
        Ok(LL_OK)
    })
}

// ============================================================================
// C ABI: Endpoints
// ============================================================================

/// Add an engine address (`host:port`) that discovery also reaches directly.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ll_add_static_endpoint(handle: u64, endpoint: *const c_char) -> i32 {
    guard("ll_add_static_endpoint", || {
        let endpoint = unsafe { str_arg(endpoint, "endpoint")? };
        provider(handle)?.add_static_endpoint(endpoint)?;
        Ok(LL_OK)
    })
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn ll_remove_static_endpoint(handle: u64, endpoint: *const c_char) -> i32 {
    guard("ll_remove_static_endpoint", || {
        let endpoint = unsafe { str_arg(endpoint, "endpoint")? };
        provider(handle)?.remove_static_endpoint(endpoint)?;
        Ok(LL_OK)
    })
}

// ============================================================================
// C ABI: Record initializers
// ============================================================================

fn init<T>(entry: &'static str, out: *mut T, value: impl FnOnce() -> T) -> i32 {
    guard(entry, || {
        let out = out_arg(out, "record")?;
        unsafe { out.write(value()) };
        Ok(LL_OK)
    })
}

/// Identity rotation, zero translation, unit scale.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ll_init_transform(transform: *mut LlTransform) -> i32 {
    init("ll_init_transform", transform, || LlTransform::IDENTITY)
}

/// No key/value pairs and no timecode.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ll_init_metadata(metadata: *mut LlMetadata) -> i32 {
    init("ll_init_metadata", metadata, LlMetadata::default)
}

/// Nothing supported, film back left to the engine.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ll_init_camera_static(camera: *mut LlCameraStatic) -> i32 {
    init("ll_init_camera_static", camera, LlCameraStatic::default)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn ll_init_camera(camera: *mut LlCamera) -> i32 {
    init("ll_init_camera", camera, LlCamera::default)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn ll_init_light_static(light: *mut LlLightStatic) -> i32 {
    init("ll_init_light_static", light, LlLightStatic::default)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn ll_init_light(light: *mut LlLight) -> i32 {
    init("ll_init_light", light, LlLight::default)
}
