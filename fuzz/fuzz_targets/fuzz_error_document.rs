#![no_main]
use databundle::{BundlePath, DirTree, PortStore, VirtualTree};
use libfuzzer_sys::fuzz_target;
use tempfile::TempDir;

// Arbitrary `.err` and `.url` content must parse or fail cleanly
fuzz_target!(|data: &[u8]| {
    let temp_dir = match TempDir::new() {
        Ok(dir) => dir,
        Err(_) => return,
    };
    let mut tree = match DirTree::new(temp_dir.path()) {
        Ok(tree) => tree,
        Err(_) => return,
    };

    let error_port = BundlePath::new("outputs/out1").unwrap();
    let reference_port = BundlePath::new("inputs/in1").unwrap();
    if tree.write(&BundlePath::new("outputs/out1.err").unwrap(), data).is_err() {
        return;
    }
    if tree.write(&BundlePath::new("inputs/in1.url").unwrap(), data).is_err() {
        return;
    }

    let ports = PortStore::new(&mut tree);
    let _ = ports.get_error(&error_port);
    let _ = ports.get_reference(&reference_port);
});
