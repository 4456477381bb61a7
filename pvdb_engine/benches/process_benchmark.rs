//! Processing-cycle benchmarks: full dispatcher cycle and bare alarm
//! evaluation.

use criterion::{Criterion, criterion_group, criterion_main};
use pvdb_common::alarm::Severity;
use pvdb_common::config::AlarmBand;
use pvdb_common::error::ScheduleError;
use pvdb_engine::device::SoftChannel;
use pvdb_engine::sched::{CallbackScheduler, ProcessCallback, TracingEventSink};
use pvdb_engine::{ProcessContext, Record, RecordBody, process};
use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;

struct NullScheduler;

impl CallbackScheduler for NullScheduler {
    fn request(&self, _cb: &Arc<ProcessCallback>) -> Result<(), ScheduleError> {
        Ok(())
    }
    fn request_delayed(
        &self,
        _cb: &Arc<ProcessCallback>,
        _delay: Duration,
    ) -> Result<(), ScheduleError> {
        Ok(())
    }
}

fn alarmed_body() -> RecordBody {
    RecordBody {
        udf: false,
        hihi: AlarmBand {
            threshold: 100.0,
            severity: Severity::Major,
        },
        high: AlarmBand {
            threshold: 90.0,
            severity: Severity::Minor,
        },
        low: AlarmBand {
            threshold: 10.0,
            severity: Severity::Minor,
        },
        lolo: AlarmBand {
            threshold: 0.0,
            severity: Severity::Major,
        },
        hyst: 2.0,
        ..RecordBody::default()
    }
}

fn bench_process_cycle(c: &mut Criterion) {
    let record = Record::new(
        "bench:pv",
        RecordBody {
            device: Some(Arc::new(SoftChannel)),
            value: 55.0,
            ..alarmed_body()
        },
    );
    let sink = TracingEventSink;
    let ctx = ProcessContext {
        scheduler: &NullScheduler,
        events: &sink,
    };

    c.bench_function("process_cycle_soft_channel", |b| {
        b.iter(|| {
            process(black_box(&record), &ctx).expect("cycle");
        })
    });
}

fn bench_check_alarms(c: &mut Criterion) {
    let mut body = alarmed_body();
    body.aftc = 2.0;

    c.bench_function("check_alarms_filtered", |b| {
        let mut value = 0.0f64;
        b.iter(|| {
            value = (value + 7.0) % 120.0;
            body.value = black_box(value);
            pvdb_engine::alarm::check_alarms(&mut body, Duration::from_millis(100));
            body.reset_alarms();
        })
    });
}

criterion_group!(benches, bench_process_cycle, bench_check_alarms);
criterion_main!(benches);
