use criterion::{Criterion, criterion_group, criterion_main};
use exchange_gateway::app::quote_service::{parse_min_amount, provider_ticker};
use exchange_gateway::app::{AddressPolicy, LockPolicy, LockPolicyConfig};
use exchange_gateway::domain::CreateExchangeRequest;
use exchange_gateway::infra::ChainAddressValidator;
use rust_decimal_macros::dec;
use std::hint::black_box;
use std::sync::Arc;
use validator::Validate;

fn bench_lock_decision(c: &mut Criterion) {
    let policy = LockPolicy::new(LockPolicyConfig::default());

    c.bench_function("should_lock", |b| {
        b.iter(|| black_box(&policy).should_lock(black_box(dec!(1500)), black_box(false)))
    });
}

fn bench_quote_normalization(c: &mut Criterion) {
    let message = "Amount does not fall within the range. Min: 50.5 Max: 100000";

    c.bench_function("parse_min_amount", |b| {
        b.iter(|| parse_min_amount(black_box(message)))
    });
    c.bench_function("provider_ticker", |b| {
        b.iter(|| provider_ticker(black_box("USDT")))
    });
}

fn bench_address_validation(c: &mut Criterion) {
    let policy = AddressPolicy::new(Arc::new(ChainAddressValidator::new()));

    c.bench_function("validate_btc_address", |b| {
        b.iter(|| {
            policy.validate(
                black_box("bc1qar0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq"),
                black_box("btc"),
            )
        })
    });
    c.bench_function("validate_multichain_stablecoin", |b| {
        b.iter(|| policy.validate(black_box("TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t"), black_box("usdt")))
    });
}

fn bench_request_validation(c: &mut Criterion) {
    let request = CreateExchangeRequest {
        currency_from: Some("usdt".to_string()),
        currency_to: Some("btc".to_string()),
        address_to: Some("bc1qar0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq".to_string()),
        amount: Some(dec!(1500)),
        ..Default::default()
    };

    c.bench_function("validate_exchange_request", |b| {
        b.iter(|| {
            let _ = black_box(&request).validate();
        })
    });
}

criterion_group!(
    benches,
    bench_lock_decision,
    bench_quote_normalization,
    bench_address_validation,
    bench_request_validation
);
criterion_main!(benches);
