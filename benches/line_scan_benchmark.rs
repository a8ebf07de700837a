// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Line scanning throughput for streamed command output.

use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use sshchain::executor::scan_lines;
use tokio::runtime::Runtime;

fn create_runtime() -> Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

/// `size` bytes of 80-column lines.
fn make_output(size: usize) -> Vec<u8> {
    let line = format!("{}\n", "x".repeat(79));
    line.as_bytes().iter().copied().cycle().take(size).collect()
}

fn bench_scan_lines(c: &mut Criterion) {
    let mut group = c.benchmark_group("scan_lines");
    let rt = create_runtime();

    for size in [1024, 100 * 1024, 1024 * 1024, 10 * 1024 * 1024] {
        let output = make_output(size);
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_with_input(
            BenchmarkId::new("short_lines", format!("{size} bytes")),
            &output,
            |b, output| {
                b.iter(|| {
                    let seen = AtomicUsize::new(0);
                    let handler = |line: &str| {
                        seen.fetch_add(line.len(), Ordering::Relaxed);
                    };
                    let lines = rt
                        .block_on(scan_lines(Cursor::new(output.as_slice()), &handler))
                        .unwrap();
                    black_box((lines, seen.load(Ordering::Relaxed)))
                });
            },
        );
    }

    // One line with no terminator at all.
    let single = vec![b'y'; 4 * 1024 * 1024];
    group.throughput(Throughput::Bytes(single.len() as u64));
    group.bench_function("single_unterminated_line", |b| {
        b.iter(|| {
            let handler = |line: &str| {
                black_box(line.len());
            };
            rt.block_on(scan_lines(Cursor::new(single.as_slice()), &handler))
                .unwrap()
        });
    });

    group.finish();
}

criterion_group!(benches, bench_scan_lines);
criterion_main!(benches);
