#![no_main]

use std::convert::Infallible;

use futures_util::stream;
use libfuzzer_sys::fuzz_target;
use multiform::bytes::Bytes;
use multiform::Multipart;
use tokio::runtime;

fuzz_target!(|data: &[u8]| {
    // The first byte picks the chunk fragmentation so boundary and CRLF
    // handling gets exercised across chunk edges, not just in one piece.
    let (chunk_len, body) = match data.split_first() {
        Some((first, rest)) => ((*first as usize % 7) + 1, rest),
        None => return,
    };

    let chunks: Vec<Result<Bytes, Infallible>> = body
        .chunks(chunk_len)
        .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
        .collect();

    let multipart = Multipart::new(stream::iter(chunks), "X-BOUNDARY");

    let rt = runtime::Builder::new_current_thread().build().expect("runtime");
    rt.block_on(async {
        let _ = multipart
            .assemble(|info| async move { info.body.bytes().await })
            .await;
    })
});
