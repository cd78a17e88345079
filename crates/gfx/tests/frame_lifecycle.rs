//! Integration tests for the frame ring, deferred destruction and submission.

use std::sync::Arc;

use cobalt_gfx::null::{NullBackend, NullOp};
use cobalt_gfx::{
    BufferInfo, BufferUsageFlags, Device, DeviceConfig, FenceInfo, GfxError, MemoryUsage,
    QueueType, SemaphoreInfo,
};

fn device_with_frames(frames: u32) -> (Arc<NullBackend>, Device) {
    let backend = Arc::new(NullBackend::new());
    let config = DeviceConfig::default().with_frames_in_flight(frames);
    let device = Device::with_config(backend.clone(), config).expect("Failed to create device");
    (backend, device)
}

fn uniform_buffer(device: &Device) -> cobalt_gfx::BufferHandle {
    device
        .create_buffer(&BufferInfo::new(
            64,
            MemoryUsage::CpuToGpu,
            BufferUsageFlags::UNIFORM_BUFFER,
        ))
        .expect("Failed to create buffer")
}

#[test]
fn test_destroy_is_deferred_by_frames_in_flight() {
    for frames in 1..=3 {
        let (backend, device) = device_with_frames(frames);
        let buffer = uniform_buffer(&device);
        let resource = device.buffer_resource(buffer);

        device.destroy_buffer(buffer);
        assert_eq!(
            device.stats().buffers,
            1,
            "Record should stay alive until the slot comes around"
        );

        for _ in 0..frames - 1 {
            device.new_frame().unwrap();
            assert_eq!(backend.count(NullOp::DestroyBuffer), 0);
        }

        device.new_frame().unwrap();
        assert_eq!(backend.count_for(NullOp::DestroyBuffer, resource), 1);
        assert_eq!(device.stats().buffers, 0);
        assert_eq!(device.stats().pending_destroys, 0);
    }
}

#[test]
fn test_physical_destroy_follows_fence_wait() {
    let (backend, device) = device_with_frames(2);
    let buffer = uniform_buffer(&device);
    let resource = device.buffer_resource(buffer);

    device.destroy_buffer(buffer);
    device.end_frame().unwrap();
    device.new_frame().unwrap();
    device.end_frame().unwrap();
    device.new_frame().unwrap();

    let destroy = backend
        .position(NullOp::DestroyBuffer, resource)
        .expect("Buffer should have been destroyed");
    let calls = backend.calls();
    let last_wait_before = calls[..destroy]
        .iter()
        .rposition(|call| call.op == NullOp::WaitForFences);
    assert!(
        last_wait_before.is_some(),
        "A fence wait must precede the physical destroy"
    );
}

#[test]
fn test_views_destroyed_before_their_texture() {
    use cobalt_gfx::texture::{
        TextureCreateInfo, TextureUsageFlags, TextureViewCreateInfo, TextureViewType,
    };
    use cobalt_gfx::{Format, TextureInfo, TextureViewInfo};

    let (backend, device) = device_with_frames(1);
    let info = TextureCreateInfo::new_2d(Format::R8G8B8A8Unorm, 8, 8, TextureUsageFlags::SAMPLED);
    let texture = device.create_texture(&TextureInfo::new(info)).unwrap();
    let view = device
        .create_texture_view(&TextureViewInfo::new(
            texture,
            TextureViewCreateInfo {
                view_type: TextureViewType::Tex2D,
                format: Format::R8G8B8A8Unorm,
                subresource_range: info.full_range(),
            },
        ))
        .unwrap();
    let texture_resource = device.texture_resource(texture);
    let view_resource = device.texture_view_resource(view);

    // Destroy in the "wrong" order on purpose.
    device.destroy_texture(texture);
    device.destroy_texture_view(view);
    device.new_frame().unwrap();

    let view_pos = backend
        .position(NullOp::DestroyTextureView, view_resource)
        .unwrap();
    let texture_pos = backend
        .position(NullOp::DestroyTexture, texture_resource)
        .unwrap();
    assert!(view_pos < texture_pos);
}

#[test]
fn test_end_frame_submits_empty_gfx_with_fence() {
    let (backend, device) = device_with_frames(2);
    device.end_frame().unwrap();

    let submits = backend.submits();
    assert_eq!(submits.len(), 1);
    assert_eq!(submits[0].queue, QueueType::Gfx);
    assert!(submits[0].lists.is_empty());
    assert!(!submits[0].fence.is_null());
    assert!(backend.fence_signaled(submits[0].fence));
}

#[test]
fn test_frame_submission_collects_lists_and_semaphores() {
    let (backend, device) = device_with_frames(2);
    let wait = device.create_semaphore(&SemaphoreInfo::default()).unwrap();
    let signal = device.create_semaphore(&SemaphoreInfo::default()).unwrap();

    let first = device.allocate_cmd_list(QueueType::Gfx).unwrap();
    let second = device.allocate_cmd_list(QueueType::Gfx).unwrap();
    device.submit(second, &[wait], &[]).unwrap();
    device.submit(first, &[], &[signal]).unwrap();
    device.end_frame().unwrap();

    let submits = backend.submits();
    assert_eq!(submits.len(), 1);
    assert_eq!(submits[0].lists.len(), 2);
    assert_eq!(submits[0].wait_semaphores.len(), 1);
    assert_eq!(submits[0].signal_semaphores.len(), 1);
    assert_eq!(backend.count(NullOp::EndCommandList), 2);

    device.destroy_semaphore(wait);
    device.destroy_semaphore(signal);
}

#[test]
fn test_compute_submitted_before_gfx_with_own_fence() {
    let (backend, device) = device_with_frames(2);
    let compute = device.allocate_cmd_list(QueueType::Compute).unwrap();
    let gfx = device.allocate_cmd_list(QueueType::Gfx).unwrap();
    device.submit(gfx, &[], &[]).unwrap();
    device.submit(compute, &[], &[]).unwrap();
    device.end_frame().unwrap();

    let submits = backend.submits();
    assert_eq!(submits.len(), 2);
    assert_eq!(submits[0].queue, QueueType::Compute);
    assert_eq!(submits[1].queue, QueueType::Gfx);
    assert_ne!(submits[0].fence, submits[1].fence);
}

#[test]
fn test_new_frame_ends_unfinished_frame() {
    let (backend, device) = device_with_frames(2);
    let cmd = device.allocate_cmd_list(QueueType::Gfx).unwrap();
    device.submit(cmd, &[], &[]).unwrap();

    device.new_frame().unwrap();
    assert_eq!(backend.count(NullOp::QueueSubmit), 1);
}

#[test]
fn test_command_pools_reset_when_slot_reused() {
    let (backend, device) = device_with_frames(2);
    let cmd = device.allocate_cmd_list(QueueType::Gfx).unwrap();
    device.submit(cmd, &[], &[]).unwrap();
    device.end_frame().unwrap();

    device.new_frame().unwrap();
    assert_eq!(backend.count(NullOp::ResetCommandPool), 0);
    device.new_frame().unwrap();
    assert_eq!(backend.count(NullOp::ResetCommandPool), 1);

    // The backend list is recycled rather than allocated again.
    let again = device.allocate_cmd_list(QueueType::Gfx).unwrap();
    assert_eq!(backend.count(NullOp::AllocateCommandList), 1);
    device.submit(again, &[], &[]).unwrap();
}

#[test]
fn test_new_frame_times_out_on_stalled_gpu() {
    let backend = Arc::new(NullBackend::new());
    let config = DeviceConfig::default()
        .with_frames_in_flight(1)
        .with_fence_timeout(1_000);
    let device = Device::with_config(backend.clone(), config).unwrap();

    let buffer = uniform_buffer(&device);
    let resource = device.buffer_resource(buffer);
    device.destroy_buffer(buffer);

    backend.set_gpu_stalled(true);
    device.end_frame().unwrap();
    assert_eq!(device.new_frame(), Err(GfxError::Timeout));
    assert_eq!(device.frame_number(), 0);
    assert!(
        backend.is_live(resource),
        "Nothing may be freed while the fence is pending"
    );

    backend.set_gpu_stalled(false);
    device.new_frame().unwrap();
    assert_eq!(device.frame_number(), 1);
    assert!(!backend.is_live(resource));
}

#[test]
fn test_rejected_submission_does_not_block_the_ring() {
    let (backend, device) = device_with_frames(2);
    backend.fail_next(NullOp::QueueSubmit, GfxError::OutOfHostMemory);
    assert_eq!(device.end_frame(), Err(GfxError::OutOfHostMemory));

    for _ in 0..3 {
        device.new_frame().unwrap();
        device.end_frame().unwrap();
    }
    assert_eq!(device.frame_number(), 3);
}

#[test]
fn test_rejected_compute_submission_does_not_block_the_ring() {
    let (backend, device) = device_with_frames(1);
    let compute = device.allocate_cmd_list(QueueType::Compute).unwrap();
    device.submit(compute, &[], &[]).unwrap();

    backend.fail_next(NullOp::QueueSubmit, GfxError::OutOfDeviceMemory);
    assert_eq!(device.end_frame(), Err(GfxError::OutOfDeviceMemory));
    device.new_frame().unwrap();
    device.end_frame().unwrap();
    device.new_frame().unwrap();
    assert_eq!(device.frame_number(), 2);
}

#[test]
fn test_failed_pool_reset_resets_both_pools_and_retries() {
    let (backend, device) = device_with_frames(1);
    let gfx = device.allocate_cmd_list(QueueType::Gfx).unwrap();
    let compute = device.allocate_cmd_list(QueueType::Compute).unwrap();
    device.submit(gfx, &[], &[]).unwrap();
    device.submit(compute, &[], &[]).unwrap();
    device.end_frame().unwrap();

    backend.fail_next(NullOp::ResetCommandPool, GfxError::OutOfHostMemory);
    assert_eq!(device.new_frame(), Err(GfxError::OutOfHostMemory));
    assert_eq!(backend.count(NullOp::ResetCommandPool), 2);
    assert_eq!(device.frame_number(), 0);

    device.new_frame().unwrap();
    assert_eq!(backend.count(NullOp::ResetCommandPool), 4);
    assert_eq!(device.frame_number(), 1);
}

#[test]
fn test_user_fences_wait_and_reset() {
    let (backend, device) = device_with_frames(2);
    let fence = device
        .create_fence(&FenceInfo::default().signaled(true))
        .unwrap();

    device.wait_for_fences(&[fence], true, 0).unwrap();
    device.reset_fences(&[fence]).unwrap();
    assert_eq!(
        device.wait_for_fences(&[fence], true, 0),
        Err(GfxError::Timeout)
    );

    device.destroy_fence(fence);
    device.new_frame().unwrap();
    device.new_frame().unwrap();
    assert_eq!(backend.count(NullOp::DestroyFence), 1);
}

#[test]
fn test_drop_destroys_everything() {
    let backend = Arc::new(NullBackend::new());
    {
        let device = Device::new(backend.clone()).unwrap();
        let buffer = uniform_buffer(&device);
        device.destroy_buffer(buffer);
        let cmd = device.allocate_cmd_list(QueueType::Gfx).unwrap();
        device.submit(cmd, &[], &[]).unwrap();
        device.end_frame().unwrap();
        device.create_semaphore(&SemaphoreInfo::default()).unwrap();
    }
    assert_eq!(backend.live_count(), 0);
}
