use bytes::BytesMut;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use protokoll_mcp::core::models::JsonRpcRequest;
use protokoll_mcp::core::value::AnyValue;
use protokoll_mcp::mcp::codec::{self, LineCodec};
use tokio_util::codec::Decoder;

fn bench_encode_request(c: &mut Criterion) {
    let params = AnyValue::object([
        ("name", AnyValue::from("protokoll_list_transcripts")),
        (
            "arguments",
            AnyValue::object([("directory", "/output"), ("sortBy", "date")]),
        ),
    ]);
    let request = JsonRpcRequest::new(42, "tools/call", Some(params));

    c.bench_function("codec_encode_tools_call", |b| {
        b.iter(|| codec::encode(black_box(&request)))
    });
}

fn bench_classify_response(c: &mut Criterion) {
    let frame = br#"{"jsonrpc":"2.0","id":7,"result":{"contents":[{"uri":"protokoll://config","mimeType":"application/json","text":"{\"outputDirectory\":\"/output\"}"}]}}"#;

    c.bench_function("codec_classify_response", |b| {
        b.iter(|| codec::classify(black_box(frame)))
    });
}

fn bench_line_decode(c: &mut Criterion) {
    let line = br#"{"jsonrpc":"2.0","method":"notifications/resources/list_changed"}"#;
    let mut stream = Vec::new();
    for _ in 0..64 {
        stream.extend_from_slice(line);
        stream.push(b'\n');
    }

    c.bench_function("line_codec_decode_64_frames", |b| {
        b.iter(|| {
            let mut codec = LineCodec::new();
            let mut src = BytesMut::from(&stream[..]);
            let mut count = 0;
            while let Ok(Some(frame)) = codec.decode(&mut src) {
                count += black_box(frame).len();
            }
            count
        })
    });
}

criterion_group!(
    benches,
    bench_encode_request,
    bench_classify_response,
    bench_line_decode
);
criterion_main!(benches);
