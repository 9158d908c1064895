use memory_dma::{AllocationError, DmaAllocator, DmaConfig};

#[test]
fn forked_child_names_backing_files_after_itself() {
    let dir = tempfile::tempdir().unwrap();
    let allocator = DmaAllocator::new(DmaConfig::default().with_mount(dir.path().join("absent")));
    let parent = std::process::id();

    // SAFETY: the child only allocates, inspects the error and exits.
    let child = unsafe { libc::fork() };
    assert!(child >= 0, "fork failed");

    if child == 0 {
        let own = std::process::id();
        let named_after_child = match allocator.allocate(4096, false) {
            Err(AllocationError::BackingStoreUnavailable { path, .. }) => path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with(&format!("ixy-{own}-"))),
            _ => false,
        };
        let code = i32::from(!(named_after_child && own != parent));
        // SAFETY: skip the test harness in the child.
        unsafe { libc::_exit(code) };
    }

    let mut status = 0;
    // SAFETY: `child` is our own, not yet reaped child.
    let waited = unsafe { libc::waitpid(child, &raw mut status, 0) };
    assert_eq!(waited, child);
    assert!(libc::WIFEXITED(status));
    assert_eq!(libc::WEXITSTATUS(status), 0);
}
