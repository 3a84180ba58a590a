//! Windows shim built directly on VirtualAlloc/VirtualFree.

use core::ffi::c_void;
use core::ptr;

const MEM_COMMIT: u32 = 0x1000;
const MEM_RESERVE: u32 = 0x2000;
const MEM_RELEASE: u32 = 0x8000;
const PAGE_READWRITE: u32 = 0x04;
const PAGE_NOACCESS: u32 = 0x01;

#[repr(C)]
struct SystemInfo {
    processor_arch: u32,
    page_size: u32,
    min_app_addr: *mut c_void,
    max_app_addr: *mut c_void,
    active_processor_mask: usize,
    number_of_processors: u32,
    processor_type: u32,
    allocation_granularity: u32,
    processor_level: u16,
    processor_revision: u16,
}

extern "system" {
    fn VirtualAlloc(addr: *mut c_void, size: usize, alloc_type: u32, protect: u32) -> *mut c_void;
    fn VirtualFree(addr: *mut c_void, size: usize, free_type: u32) -> i32;
    fn VirtualProtect(addr: *mut c_void, size: usize, new_protect: u32, old: *mut u32) -> i32;
    fn GetSystemInfo(info: *mut SystemInfo);
}

pub unsafe fn map_anonymous(size: usize) -> *mut u8 {
    let p = VirtualAlloc(ptr::null_mut(), size, MEM_COMMIT | MEM_RESERVE, PAGE_READWRITE);
    p as *mut u8
}

pub unsafe fn unmap(ptr: *mut u8, _size: usize) {
    // MEM_RELEASE frees the whole reservation; size must be zero.
    VirtualFree(ptr as *mut c_void, 0, MEM_RELEASE);
}

pub unsafe fn protect_none(ptr: *mut u8, size: usize) {
    let mut old = 0u32;
    VirtualProtect(ptr as *mut c_void, size, PAGE_NOACCESS, &mut old);
}

/// Large pages need SeLockMemoryPrivilege and a different map path; skip.
pub unsafe fn advise_huge(_ptr: *mut u8, _size: usize) {}

pub fn query_page_size() -> usize {
    unsafe {
        let mut info = core::mem::zeroed::<SystemInfo>();
        GetSystemInfo(&mut info);
        let sz = info.page_size as usize;
        if sz == 0 {
            4096
        } else {
            sz
        }
    }
}
