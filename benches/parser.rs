use aventa::Parser;
use criterion::{criterion_group, criterion_main, Criterion};

pub fn parse_countdown_benchmark(c: &mut Criterion) {
    c.bench_function("parse countdown", |b| {
        b.iter(|| {
            let parser = Parser::from_file("resources/countdown.av").unwrap();
            parser.parse().unwrap()
        })
    });
}

pub fn parse_sign_benchmark(c: &mut Criterion) {
    c.bench_function("parse sign", |b| {
        b.iter(|| {
            let parser = Parser::from_file("resources/sign.av").unwrap();
            parser.parse().unwrap()
        })
    });
}

criterion_group!(parser, parse_countdown_benchmark, parse_sign_benchmark);
criterion_main!(parser);
