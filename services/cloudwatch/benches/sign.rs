use std::time::SystemTime;

use aws_sigv4::http_request::PayloadChecksumKind;
use aws_sigv4::http_request::SignableBody;
use aws_sigv4::http_request::SignableRequest;
use aws_sigv4::http_request::SigningSettings;
use aws_sigv4::sign::v4::SigningParams;
use criterion::criterion_group;
use criterion::criterion_main;
use criterion::Criterion;
use once_cell::sync::Lazy;
use putmetric_cloudwatch::{Credential, MetricDatum, RequestBuilder, RequestSigner, Unit};
use putmetric_core::{Context, SignRequest};

criterion_group!(benches, bench_sign, bench_build);
criterion_main!(benches);

static RUNTIME: Lazy<tokio::runtime::Runtime> = Lazy::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .expect("must success")
});

const URL: &str = "https://monitoring.us-east-1.amazonaws.com/";

fn body() -> String {
    let mut builder = RequestBuilder::new("telemetry");
    for i in 0..20 {
        builder
            .add_single(
                &MetricDatum::new(format!("bench.metric.{i}"))
                    .with_timestamp(chrono::Utc::now())
                    .with_unit(Unit::Milliseconds)
                    .with_value(i as f64)
                    .with_dimension("host", "bench"),
            )
            .expect("datum must be valid");
    }
    builder.take_batch()[0].as_str().to_string()
}

pub fn bench_sign(c: &mut Criterion) {
    let mut group = c.benchmark_group("sign");
    let body = body();

    group.bench_function("putmetric", |b| {
        let cred = Credential {
            access_key_id: "access_key_id".to_string(),
            secret_access_key: "secret_access_key".to_string(),
            region: Some("us-east-1".to_string()),
            ..Default::default()
        };

        let s = RequestSigner::default();
        let ctx = Context::new();

        b.to_async(&*RUNTIME).iter(|| async {
            let mut req = http::Request::new(());
            *req.method_mut() = http::Method::POST;
            *req.uri_mut() = URL.parse().expect("url must be valid");

            let (mut parts, _) = req.into_parts();
            s.sign_request(&ctx, &mut parts, body.as_bytes(), &cred, chrono::Utc::now())
                .await
                .expect("must success")
        })
    });

    group.bench_function("aws_sigv4", |b| {
        let mut ss = SigningSettings::default();
        ss.payload_checksum_kind = PayloadChecksumKind::XAmzSha256;

        let credentials = aws_credential_types::Credentials::new(
            "access_key_id".to_string(),
            "secret_access_key".to_string(),
            None,
            None,
            "test",
        )
        .into();

        let sp = SigningParams::builder()
            .identity(&credentials)
            .region("us-east-1")
            .name("monitoring")
            .time(SystemTime::now())
            .settings(ss)
            .build()
            .expect("signing params must be valid")
            .into();

        b.iter(|| {
            let _ = aws_sigv4::http_request::sign(
                SignableRequest::new(
                    "POST",
                    URL,
                    Vec::<(&str, &str)>::new().into_iter(),
                    SignableBody::Bytes(body.as_bytes()),
                )
                .expect("request must be valid"),
                &sp,
            )
            .expect("signing must succeed");
        })
    });

    group.finish();
}

pub fn bench_build(c: &mut Criterion) {
    c.bench_function("build_full_body", |b| b.iter(body));
}
