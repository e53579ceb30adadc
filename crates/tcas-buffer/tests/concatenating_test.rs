use std::sync::{Arc, Mutex};

use prost::Message;
use tcas_buffer::{
    new_buffer_from_error, new_cas_concatenating_buffer, BoxBuffer, Buffer, ChunkPolicy,
    ValidatedByteSliceBuffer,
};
use tcas_core::proto::ActionResult;
use tcas_core::{CasError, Code};
use tcas_digest::Digest;

/// Digest of "Hello", as far as the concatenating buffer is concerned.
fn hello() -> Digest {
    Digest::must_new("ubuntu1804", "8b1a9953c4611296a827abf8c47804d7", 5)
}

/// Serves `data` one byte per small buffer and records requested offsets.
fn byte_per_buffer(
    data: &'static [u8],
) -> (
    impl Fn(i64) -> (BoxBuffer, i64) + Send + Sync + 'static,
    Arc<Mutex<Vec<i64>>>,
) {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let recorded = calls.clone();
    let fetcher = move |offset: i64| {
        recorded.lock().unwrap().push(offset);
        let i = offset as usize;
        (ValidatedByteSliceBuffer::boxed(&data[i..i + 1]), offset)
    };
    (fetcher, calls)
}

#[test]
fn read_at_fetches_only_the_requested_range() {
    let (fetcher, calls) = byte_per_buffer(b"Hello");
    let b = new_cas_concatenating_buffer(&hello(), fetcher);

    let mut buf = [0u8; 3];
    assert_eq!(b.read_at(&mut buf, 1).unwrap(), 3);
    assert_eq!(&buf, b"ell");
    assert_eq!(*calls.lock().unwrap(), vec![1, 2, 3]);
}

#[test]
fn read_at_across_uneven_fragments() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let recorded = calls.clone();
    let b = new_cas_concatenating_buffer(
        &Digest::must_new("foo", "8b1a9953c4611296a827abf8c47804d7", 5),
        move |offset: i64| {
            recorded.lock().unwrap().push(offset);
            let (data, start): (&'static [u8], i64) = match offset {
                0 | 1 => (b"He", 0),
                2 => (b"l", 2),
                3 | 4 => (b"lo", 3),
                _ => panic!("unexpected offset {offset}"),
            };
            (ValidatedByteSliceBuffer::boxed(data), start)
        },
    );

    let mut buf = [0u8; 3];
    assert_eq!(b.read_at(&mut buf, 1).unwrap(), 3);
    assert_eq!(&buf, b"ell");
    assert_eq!(*calls.lock().unwrap(), vec![1, 2, 3]);
}

#[test]
fn read_at_negative_offset() {
    let (fetcher, calls) = byte_per_buffer(b"Hello");
    let err = new_cas_concatenating_buffer(&hello(), fetcher)
        .read_at(&mut [0u8; 3], -123)
        .unwrap_err();
    assert_eq!(err, CasError::invalid_argument("Negative read offset: -123"));
    assert!(calls.lock().unwrap().is_empty());
}

#[test]
fn read_at_past_end() {
    let (fetcher, calls) = byte_per_buffer(b"Hello");
    let b = new_cas_concatenating_buffer(&hello(), fetcher);
    assert_eq!(b.read_at(&mut [0u8; 3], 6).unwrap(), 0);
    assert!(calls.lock().unwrap().is_empty());
}

#[test]
fn read_at_truncated_by_end_of_buffer() {
    let b = new_cas_concatenating_buffer(&hello(), |_| {
        (ValidatedByteSliceBuffer::boxed(&b"Hello"[..]), 0)
    });
    let mut buf = [0u8; 5];
    assert_eq!(b.read_at(&mut buf, 2).unwrap(), 3);
    assert_eq!(&buf[..3], b"llo");
}

#[test]
fn read_at_io_failure() {
    let b = new_cas_concatenating_buffer(&hello(), |offset| {
        if offset < 2 {
            (ValidatedByteSliceBuffer::boxed(&b"He"[..]), 0)
        } else {
            (new_buffer_from_error(CasError::unavailable("Server on fire")), 2)
        }
    });
    let err = b.read_at(&mut [0u8; 5], 0).unwrap_err();
    assert_eq!(err, CasError::unavailable("Server on fire"));
}

#[test]
fn empty_small_buffer_is_an_error() {
    let b = new_cas_concatenating_buffer(&hello(), |offset| {
        (ValidatedByteSliceBuffer::boxed(bytes::Bytes::new()), offset)
    });
    assert_eq!(b.read_at(&mut [0u8; 5], 0).unwrap_err().code(), Code::Internal);

    let b = new_cas_concatenating_buffer(&hello(), |offset| {
        (ValidatedByteSliceBuffer::boxed(bytes::Bytes::new()), offset)
    });
    assert_eq!(b.to_byte_slice(10).unwrap_err().code(), Code::Internal);
}

#[test]
fn to_byte_slice_and_writer() {
    let (fetcher, _) = byte_per_buffer(b"Hello");
    let b = new_cas_concatenating_buffer(&hello(), fetcher);
    let (a, b) = b.clone_stream();
    assert_eq!(&a.to_byte_slice(5).unwrap()[..], b"Hello");

    let mut out = Vec::new();
    b.into_writer(&mut out).unwrap();
    assert_eq!(out, b"Hello");
}

#[test]
fn to_byte_slice_maximum_size() {
    let (fetcher, calls) = byte_per_buffer(b"Hello");
    let err = new_cas_concatenating_buffer(&hello(), fetcher)
        .to_byte_slice(4)
        .unwrap_err();
    assert_eq!(
        err.message(),
        "Buffer is 5 bytes in size, while a maximum of 4 bytes is permitted"
    );
    assert!(calls.lock().unwrap().is_empty());
}

#[test]
fn chunk_reader_at_offset() {
    let (fetcher, calls) = byte_per_buffer(b"Hello");
    let mut r = new_cas_concatenating_buffer(&hello(), fetcher)
        .to_chunk_reader(2, ChunkPolicy::exactly(2));
    assert_eq!(&r.read().unwrap().unwrap()[..], b"ll");
    assert_eq!(&r.read().unwrap().unwrap()[..], b"o");
    assert!(r.read().unwrap().is_none());
    assert_eq!(*calls.lock().unwrap(), vec![2, 3, 4]);
}

#[test]
fn action_result_from_concatenated_blocks() {
    let encoded = ActionResult {
        exit_code: 42,
        stdout_raw: b"Hello".to_vec(),
        ..Default::default()
    }
    .encode_to_vec();
    let encoded: &'static [u8] = Box::leak(encoded.into_boxed_slice());
    let digest = Digest::must_new("ubuntu1804", &"0".repeat(64), encoded.len() as i64);

    let b = new_cas_concatenating_buffer(&digest, move |offset| {
        let start = offset - offset % 4;
        let end = (start as usize + 4).min(encoded.len());
        (
            ValidatedByteSliceBuffer::boxed(&encoded[start as usize..end]),
            start,
        )
    });
    let ar = b.to_action_result(1000).unwrap();
    assert_eq!(ar.exit_code, 42);
    assert_eq!(ar.stdout_raw, b"Hello");
}

#[test]
fn malformed_action_result() {
    let digest = Digest::must_new("ubuntu1804", &"0".repeat(64), 3);
    let b = new_cas_concatenating_buffer(&digest, |_| {
        (ValidatedByteSliceBuffer::boxed(&b"\xff\xff\xff"[..]), 0)
    });
    let err = b.to_action_result(100).unwrap_err();
    assert_eq!(err.code(), Code::InvalidArgument);
    assert!(err.message().starts_with("Failed to unmarshal message: "));
}

proptest::proptest! {
    #[test]
    fn read_at_matches_contiguous_data(
        data in proptest::collection::vec(proptest::prelude::any::<u8>(), 1..300),
        block in 1usize..64,
        offset in 0usize..300,
        len in 0usize..300,
    ) {
        let data: &'static [u8] = Box::leak(data.into_boxed_slice());
        let digest = Digest::must_new("", &"0".repeat(64), data.len() as i64);
        let b = new_cas_concatenating_buffer(&digest, move |offset| {
            let start = offset as usize / block * block;
            let end = (start + block).min(data.len());
            (ValidatedByteSliceBuffer::boxed(&data[start..end]), start as i64)
        });

        let mut buf = vec![0u8; len];
        let n = b.read_at(&mut buf, offset as i64).unwrap();
        let expected = data.get(offset..).map_or(&[][..], |tail| &tail[..len.min(tail.len())]);
        proptest::prop_assert_eq!(&buf[..n], expected);
    }
}
