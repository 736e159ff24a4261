// vim: tw=80
macro_rules! t {
    ($e:expr) => (match $e {
        Ok(e) => e,
        Err(e) => panic!("{} failed with {:?}", stringify!($e), e),
    })
}

mod files;
mod lifecycle;

/// Helper to generate the runtime used by the threaded tests
fn basic_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap()
}

/// Contents for `sectors` sectors starting at `sector`, unique to each sector
fn pattern(sector: u64, sectors: u64) -> Vec<u8> {
    (0..sectors).flat_map(|s| {
        let tag = (sector + s).to_le_bytes();
        (0..512).map(move |i| tag[i % 8] ^ (i / 8) as u8)
    }).collect()
}
