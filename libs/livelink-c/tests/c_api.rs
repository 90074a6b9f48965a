// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! The `ll_*` entry points, driven the way a C host would.

mod common;

use std::ffi::{CStr, c_char, c_void};
use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};

use common::{FakeEngine, TIMEOUT, create_provider, cstr, drain_events, loopback_yaml, wait_until};
use livelink::types::{BusMessage, RoleFrameData, TimecodeFormat};
use livelink_c::*;
use serial_test::serial;

fn register_skeleton(handle: u64, name: &str, bones: &[LlBone]) -> u32 {
    let mut subject = 0;
    let status = unsafe {
        ll_subject_register_animation(
            handle,
            cstr(name).as_ptr(),
            ptr::null(),
            0,
            bones.as_ptr(),
            bones.len() as u32,
            0,
            &mut subject,
        )
    };
    assert_eq!(status, LL_OK);
    subject
}

fn push(handle: u64, subject: u32, world_time: f64, transforms: &[LlTransform]) -> i32 {
    unsafe {
        ll_push_frame(
            handle,
            subject,
            world_time,
            transforms.as_ptr(),
            transforms.len() as u32,
            ptr::null(),
            0,
            ptr::null(),
        )
    }
}

#[test]
fn version_and_messages() {
    assert_eq!(ll_get_version(), livelink::types::LIVELINK_API_VERSION);
    let message = unsafe { CStr::from_ptr(ll_status_message(LL_NOT_CONNECTED)) };
    assert!(message.to_str().unwrap().contains("connected"));
    let unknown = unsafe { CStr::from_ptr(ll_status_message(999)) };
    assert_eq!(unknown.to_str().unwrap(), "unknown status");
}

#[test]
#[serial]
fn destroyed_handle_is_invalid_everywhere() {
    let handle = create_provider("c-destroyed", "c-destroyed");
    assert_eq!(unsafe { ll_provider_destroy(handle) }, LL_OK);

    let mut subject = 0;
    let status = unsafe {
        ll_subject_register_transform(
            handle,
            cstr("Root").as_ptr(),
            ptr::null(),
            0,
            0,
            &mut subject,
        )
    };
    assert_eq!(status, LL_INVALID_HANDLE);
    assert_eq!(push(handle, 1, 0.0, &[LlTransform::IDENTITY]), LL_INVALID_HANDLE);

    let mut state = -1;
    assert_eq!(unsafe { ll_connection_state(handle, &mut state) }, LL_INVALID_HANDLE);
    assert!(!ll_has_connection(handle));

    // Destroying twice, or a handle that never existed, is harmless.
    assert_eq!(unsafe { ll_provider_destroy(handle) }, LL_OK);
    assert_eq!(unsafe { ll_provider_destroy(0) }, LL_OK);
    assert_eq!(unsafe { ll_subject_unregister(0, 1) }, LL_INVALID_HANDLE);
}

#[test]
#[serial]
fn provider_names_are_unique_until_destroyed() {
    let first = create_provider("c-unique", "c-unique");

    let mut handle = 0;
    let status = unsafe {
        ll_provider_create_with_config(
            cstr("c-unique").as_ptr(),
            loopback_yaml("c-unique").as_ptr(),
            &mut handle,
        )
    };
    assert_eq!(status, LL_DUPLICATE_NAME);

    assert_eq!(unsafe { ll_provider_destroy(first) }, LL_OK);
    let second = create_provider("c-unique", "c-unique");
    assert_ne!(first, second);
    assert_eq!(unsafe { ll_provider_destroy(second) }, LL_OK);
}

#[test]
#[serial]
fn bad_arguments_are_rejected() {
    let mut handle = 0;
    assert_eq!(
        unsafe { ll_provider_create(ptr::null(), &mut handle) },
        LL_INVALID_ARGUMENT
    );
    assert_eq!(
        unsafe { ll_provider_create(cstr("c-null-out").as_ptr(), ptr::null_mut()) },
        LL_INVALID_ARGUMENT
    );

    let invalid_utf8: [c_char; 3] = [0xC3u8 as c_char, 0x28, 0];
    assert_eq!(
        unsafe { ll_provider_create(invalid_utf8.as_ptr(), &mut handle) },
        LL_INVALID_ARGUMENT
    );

    let bad_yaml = cstr("heartbeat_interval_ms: 0\n");
    assert_eq!(
        unsafe {
            ll_provider_create_with_config(cstr("c-bad-yaml").as_ptr(), bad_yaml.as_ptr(), &mut handle)
        },
        LL_INVALID_ARGUMENT
    );

    let provider = create_provider("c-bad-args", "c-bad-args");
    let mut subject = 0;
    // Non-zero count with a null array.
    let status = unsafe {
        ll_subject_register_basic(
            provider,
            cstr("Props").as_ptr(),
            ptr::null(),
            2,
            0,
            &mut subject,
        )
    };
    assert_eq!(status, LL_INVALID_ARGUMENT);

    let status = unsafe {
        ll_subject_register_camera(
            provider,
            cstr("Cam").as_ptr(),
            ptr::null(),
            0,
            ptr::null(),
            0,
            &mut subject,
        )
    };
    assert_eq!(status, LL_INVALID_ARGUMENT);

    let mut missing = [0 as c_char; LL_NAME_LEN];
    missing.iter_mut().for_each(|c| *c = b'x' as c_char);
    let unterminated = [LlBone {
        name: missing,
        parent_index: -1,
    }];
    let status = unsafe {
        ll_subject_register_animation(
            provider,
            cstr("Skel").as_ptr(),
            ptr::null(),
            0,
            unterminated.as_ptr(),
            1,
            0,
            &mut subject,
        )
    };
    assert_eq!(status, LL_INVALID_ARGUMENT);

    assert_eq!(
        unsafe { ll_add_static_endpoint(provider, ptr::null()) },
        LL_INVALID_ARGUMENT
    );
    assert_eq!(unsafe { ll_provider_destroy(provider) }, LL_OK);
}

#[test]
#[serial]
fn frames_flow_once_an_engine_answers() {
    let engine = FakeEngine::join("c-cam1");
    let handle = create_provider("Cam1", "c-cam1");
    let root = register_skeleton(handle, "Root", &[LlBone::new("root", -1)]);

    let mut moved = LlTransform::IDENTITY;
    moved.translation = [1.0, 2.0, 3.0];
    assert_eq!(push(handle, root, 1.0, &[moved]), LL_NOT_CONNECTED);

    engine.connect("Cam1", handle);
    let mut state = -1;
    assert_eq!(unsafe { ll_connection_state(handle, &mut state) }, LL_OK);
    assert_eq!(state, 2);

    assert_eq!(push(handle, root, 2.0, &[moved]), LL_OK);
    match engine.next_data(TIMEOUT) {
        Some(BusMessage::SubjectStatic { subject, data }) => {
            assert_eq!(subject, "Root");
            assert_eq!(data.transform_count(), 1);
        }
        other => panic!("expected static data first, got {other:?}"),
    }
    let frame = engine.next_frame("Root").expect("frame");
    assert_eq!(frame.world_time, 2.0);
    assert_eq!(frame.transforms[0].translation.z, 3.0);

    let events = drain_events(handle);
    assert!(events.contains(&LlConnectionEvent {
        previous: 0,
        current: 1
    }));
    assert!(events.contains(&LlConnectionEvent {
        previous: 1,
        current: 2
    }));
    assert_eq!(unsafe { ll_poll_connection_event(handle, &mut LlConnectionEvent::default()) }, LL_NO_EVENT);

    assert_eq!(unsafe { ll_provider_destroy(handle) }, LL_OK);
    let goodbye = engine.next_matching(TIMEOUT, |e| matches!(e.message, BusMessage::Disconnect));
    assert!(goodbye.is_some());
}

#[test]
#[serial]
fn frame_errors_map_to_status_codes() {
    let handle = create_provider("c-frame-errors", "c-frame-errors");
    let root = register_skeleton(handle, "Root", &[LlBone::new("root", -1)]);

    // Layout and value errors are reported even without an engine.
    let two = [LlTransform::IDENTITY, LlTransform::IDENTITY];
    assert_eq!(push(handle, root, 0.0, &two), LL_FORMAT_ERROR);

    let mut skewed = LlTransform::IDENTITY;
    skewed.rotation = [0.0, 0.0, 0.0, 2.0];
    assert_eq!(push(handle, root, 0.0, &[skewed]), LL_INVALID_ROTATION);

    let mut nan = LlTransform::IDENTITY;
    nan.translation[0] = f32::NAN;
    assert_eq!(push(handle, root, 0.0, &[nan]), LL_INVALID_VALUE);

    assert_eq!(push(handle, root + 100, 0.0, &[LlTransform::IDENTITY]), LL_UNKNOWN_SUBJECT);

    assert_eq!(unsafe { ll_subject_unregister(handle, root) }, LL_OK);
    assert_eq!(push(handle, root, 0.0, &[LlTransform::IDENTITY]), LL_UNKNOWN_SUBJECT);
    assert_eq!(unsafe { ll_subject_unregister(handle, root) }, LL_UNKNOWN_SUBJECT);

    assert_eq!(unsafe { ll_provider_destroy(handle) }, LL_OK);
}

#[test]
#[serial]
fn silent_engine_times_out() {
    let engine = FakeEngine::join("c-timeout");
    let handle = create_provider("c-timeout", "c-timeout");
    let root = register_skeleton(handle, "Root", &[LlBone::new("root", -1)]);
    engine.connect("c-timeout", handle);
    drain_events(handle);

    // No more heartbeats from the engine.
    let mut events = Vec::new();
    assert!(wait_until(TIMEOUT, || {
        events.extend(drain_events(handle));
        events.contains(&LlConnectionEvent {
            previous: 2,
            current: 0,
        })
    }));
    assert!(wait_until(TIMEOUT, || !ll_has_connection(handle)));
    assert_eq!(push(handle, root, 5.0, &[LlTransform::IDENTITY]), LL_NOT_CONNECTED);

    assert_eq!(unsafe { ll_provider_destroy(handle) }, LL_OK);
}

extern "C" fn count_events(_handle: u64, event: LlConnectionEvent, user_data: *mut c_void) {
    let counter = unsafe { &*(user_data as *const AtomicUsize) };
    if event.current == 2 {
        counter.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
#[serial]
fn callback_sees_connection() {
    static CONNECTED: AtomicUsize = AtomicUsize::new(0);

    let engine = FakeEngine::join("c-callback");
    let handle = create_provider("c-callback", "c-callback");
    let status = unsafe {
        ll_register_connection_callback(
            handle,
            Some(count_events),
            &CONNECTED as *const AtomicUsize as *mut c_void,
        )
    };
    assert_eq!(status, LL_OK);

    engine.connect("c-callback", handle);
    assert!(wait_until(TIMEOUT, || CONNECTED.load(Ordering::SeqCst) >= 1));

    assert_eq!(
        unsafe { ll_register_connection_callback(handle, None, ptr::null_mut()) },
        LL_OK
    );
    assert_eq!(unsafe { ll_provider_destroy(handle) }, LL_OK);
}

#[test]
#[serial]
fn replace_flag_swaps_schema() {
    let handle = create_provider("c-replace", "c-replace");
    let names = [cstr("focus"), cstr("iris")];
    let name_ptrs: Vec<*const c_char> = names.iter().map(|n| n.as_ptr()).collect();

    let mut first = 0;
    let status = unsafe {
        ll_subject_register_basic(handle, cstr("Lens").as_ptr(), name_ptrs.as_ptr(), 1, 0, &mut first)
    };
    assert_eq!(status, LL_OK);

    // Same schema again: same id.
    let mut again = 0;
    let status = unsafe {
        ll_subject_register_basic(handle, cstr("Lens").as_ptr(), name_ptrs.as_ptr(), 1, 1, &mut again)
    };
    assert_eq!(status, LL_OK);
    assert_eq!(again, first);

    // Different schema without replace is refused.
    let mut other = 0;
    let status = unsafe {
        ll_subject_register_basic(handle, cstr("Lens").as_ptr(), name_ptrs.as_ptr(), 2, 0, &mut other)
    };
    assert_eq!(status, LL_DUPLICATE_NAME);

    // Any nonzero byte asks for replacement.
    let mut replaced = 0;
    let status = unsafe {
        ll_subject_register_basic(handle, cstr("Lens").as_ptr(), name_ptrs.as_ptr(), 2, 2, &mut replaced)
    };
    assert_eq!(status, LL_OK);
    assert_ne!(replaced, first);

    let mut looked_up = 0;
    assert_eq!(
        unsafe { ll_subject_lookup(handle, cstr("Lens").as_ptr(), &mut looked_up) },
        LL_OK
    );
    assert_eq!(looked_up, replaced);
    assert_eq!(
        unsafe { ll_subject_lookup(handle, cstr("Nope").as_ptr(), &mut looked_up) },
        LL_NOT_FOUND
    );

    let values = [0.5f32, 2.8];
    let status = unsafe {
        ll_push_frame(handle, first, 0.0, ptr::null(), 0, values.as_ptr(), 2, ptr::null())
    };
    assert_eq!(status, LL_UNKNOWN_SUBJECT);

    assert_eq!(unsafe { ll_provider_destroy(handle) }, LL_OK);
}

#[test]
#[serial]
fn camera_and_light_frames_carry_role_values() {
    let engine = FakeEngine::join("c-roles");
    let handle = create_provider("c-roles", "c-roles");

    let mut camera_static = LlCameraStatic::default();
    assert_eq!(unsafe { ll_init_camera_static(&mut camera_static) }, LL_OK);
    camera_static.is_field_of_view_supported = 1;
    let mut camera_id = 0;
    let status = unsafe {
        ll_subject_register_camera(
            handle,
            cstr("Camera").as_ptr(),
            ptr::null(),
            0,
            &camera_static,
            0,
            &mut camera_id,
        )
    };
    assert_eq!(status, LL_OK);

    let mut light_static = LlLightStatic::default();
    assert_eq!(unsafe { ll_init_light_static(&mut light_static) }, LL_OK);
    light_static.is_light_color_supported = 7;
    let mut light_id = 0;
    let status = unsafe {
        ll_subject_register_light(
            handle,
            cstr("Key").as_ptr(),
            ptr::null(),
            0,
            &light_static,
            0,
            &mut light_id,
        )
    };
    assert_eq!(status, LL_OK);

    engine.connect("c-roles", handle);

    let mut transform = LlTransform::default();
    let mut camera = LlCamera::default();
    assert_eq!(unsafe { ll_init_transform(&mut transform) }, LL_OK);
    assert_eq!(unsafe { ll_init_camera(&mut camera) }, LL_OK);
    camera.field_of_view = 35.0;
    let status = unsafe {
        ll_push_camera_frame(handle, camera_id, 1.0, &transform, ptr::null(), 0, ptr::null(), &camera)
    };
    assert_eq!(status, LL_OK);

    let mut light = LlLight::default();
    assert_eq!(unsafe { ll_init_light(&mut light) }, LL_OK);
    light.light_color = [10, 20, 30, 0];
    let status = unsafe {
        ll_push_light_frame(handle, light_id, 1.0, &transform, ptr::null(), 0, ptr::null(), &light)
    };
    assert_eq!(status, LL_OK);

    match engine.next_frame("Camera").expect("camera frame").role {
        RoleFrameData::Camera(values) => assert_eq!(values.field_of_view, 35.0),
        other => panic!("expected camera values, got {other:?}"),
    }
    match engine.next_frame("Key").expect("light frame").role {
        RoleFrameData::Light(values) => assert_eq!(values.light_color, [10, 20, 30, 255]),
        other => panic!("expected light values, got {other:?}"),
    }

    camera.projection = 7;
    let status = unsafe {
        ll_push_camera_frame(handle, camera_id, 2.0, &transform, ptr::null(), 0, ptr::null(), &camera)
    };
    assert_eq!(status, LL_INVALID_ARGUMENT);

    assert_eq!(unsafe { ll_provider_destroy(handle) }, LL_OK);
}

#[test]
#[serial]
fn metadata_reaches_the_engine() {
    let engine = FakeEngine::join("c-metadata");
    let handle = create_provider("c-metadata", "c-metadata");
    let mut subject = 0;
    let status = unsafe {
        ll_subject_register_transform(
            handle,
            cstr("Prop").as_ptr(),
            ptr::null(),
            0,
            0,
            &mut subject,
        )
    };
    assert_eq!(status, LL_OK);
    engine.connect("c-metadata", handle);

    let pairs = [LlKeyValue::new("take", "12")];
    let mut metadata = LlMetadata::default();
    assert_eq!(unsafe { ll_init_metadata(&mut metadata) }, LL_OK);
    metadata.key_values = pairs.as_ptr();
    metadata.key_value_count = 1;
    metadata.timecode = LlTimecode {
        hours: 1,
        minutes: 0,
        seconds: 2,
        frames: 3,
        format: TimecodeFormat::Fps25 as i32,
    };

    let transform = LlTransform::IDENTITY;
    let status = unsafe {
        ll_push_frame(handle, subject, 0.5, &transform, 1, ptr::null(), 0, &metadata)
    };
    assert_eq!(status, LL_OK);

    let frame = engine.next_frame("Prop").expect("frame");
    assert_eq!(frame.metadata.string_metadata["take"], "12");
    let scene_time = frame.metadata.scene_time.expect("timecode");
    assert_eq!(scene_time.timecode.frames, 3);
    assert_eq!(scene_time.rate.numerator, 25);

    metadata.timecode.format = 42;
    let status = unsafe {
        ll_push_frame(handle, subject, 0.6, &transform, 1, ptr::null(), 0, &metadata)
    };
    assert_eq!(status, LL_FORMAT_ERROR);

    assert_eq!(unsafe { ll_provider_destroy(handle) }, LL_OK);
}

#[test]
#[serial]
fn static_endpoints_on_loopback_are_accepted() {
    let handle = create_provider("c-static", "c-static");
    let endpoint = cstr("192.168.1.20:6666");
    assert_eq!(unsafe { ll_add_static_endpoint(handle, endpoint.as_ptr()) }, LL_OK);
    assert_eq!(unsafe { ll_remove_static_endpoint(handle, endpoint.as_ptr()) }, LL_OK);
    assert_eq!(unsafe { ll_provider_destroy(handle) }, LL_OK);
}

#[test]
#[serial]
fn initializers_reject_null() {
    assert_eq!(unsafe { ll_init_transform(ptr::null_mut()) }, LL_INVALID_ARGUMENT);
    assert_eq!(unsafe { ll_init_light(ptr::null_mut()) }, LL_INVALID_ARGUMENT);

    let mut transform = LlTransform {
        rotation: [0.0; 4],
        translation: [9.0; 3],
        scale: [0.0; 3],
    };
    assert_eq!(unsafe { ll_init_transform(&mut transform) }, LL_OK);
    assert_eq!(transform, LlTransform::IDENTITY);
}

#[test]
#[serial]
fn table_exhaustion_is_out_of_resources() {
    let capacity = FacadeConfig::default().max_providers;
    let mut handles = Vec::new();
    let mut exhausted = false;

    for i in 0..=capacity {
        let mut handle = 0;
        let status = unsafe {
            ll_provider_create_with_config(
                cstr(&format!("c-many-{i}")).as_ptr(),
                loopback_yaml("c-many").as_ptr(),
                &mut handle,
            )
        };
        match status {
            LL_OK => handles.push(handle),
            LL_OUT_OF_RESOURCES => {
                exhausted = true;
                break;
            }
            other => panic!("unexpected status {other}"),
        }
    }
    assert!(exhausted);
    assert!(handles.len() <= capacity);

    // A freed slot is usable again.
    let freed = handles.pop().unwrap();
    assert_eq!(unsafe { ll_provider_destroy(freed) }, LL_OK);
    handles.push(create_provider("c-many-again", "c-many"));

    for handle in handles {
        assert_eq!(unsafe { ll_provider_destroy(handle) }, LL_OK);
    }
}

#[test]
#[serial]
fn subjects_and_frames_must_fit_one_datagram() {
    let engine = FakeEngine::join("c-datagram");
    let handle = create_provider("c-datagram", "c-datagram");

    let skeleton = |count: i32| -> Vec<LlBone> {
        (0..count)
            .map(|i| LlBone::new(&format!("bone_{i}"), i - 1))
            .collect()
    };

    let huge = skeleton(1000);
    let mut refused = 0;
    let status = unsafe {
        ll_subject_register_animation(
            handle,
            cstr("Huge").as_ptr(),
            ptr::null(),
            0,
            huge.as_ptr(),
            huge.len() as u32,
            0,
            &mut refused,
        )
    };
    assert_eq!(status, LL_OUT_OF_RESOURCES);
    let mut looked_up = 0;
    assert_eq!(
        unsafe { ll_subject_lookup(handle, cstr("Huge").as_ptr(), &mut looked_up) },
        LL_NOT_FOUND
    );

    let body = register_skeleton(handle, "Body", &skeleton(300));
    engine.connect("c-datagram", handle);

    let transforms = vec![LlTransform::IDENTITY; 300];
    assert_eq!(push(handle, body, 1.0, &transforms), LL_OK);
    let frame = engine.next_frame("Body").expect("300 bone frame");
    assert_eq!(frame.transforms.len(), 300);

    // The skeleton fits, but this much metadata on top of it does not.
    let pairs: Vec<LlKeyValue> = (0..200)
        .map(|i| LlKeyValue::new(&format!("key_{i:03}_{}", "k".repeat(100)), &"v".repeat(120)))
        .collect();
    let metadata = LlMetadata {
        key_values: pairs.as_ptr(),
        key_value_count: pairs.len() as u32,
        ..LlMetadata::default()
    };
    let status = unsafe {
        ll_push_frame(
            handle,
            body,
            2.0,
            transforms.as_ptr(),
            transforms.len() as u32,
            ptr::null(),
            0,
            &metadata,
        )
    };
    assert_eq!(status, LL_OUT_OF_RESOURCES);

    assert_eq!(unsafe { ll_provider_destroy(handle) }, LL_OK);
}
