use common::AggregateId;
use criterion::{Criterion, criterion_group, criterion_main};
use domain::{
    Aggregate, AllocationInstructions, Applicant, ApplicationCommand, ApplicationConfig,
    ApplicationService, DatacapAllocator, EventSourcedRepository, KycResult,
};
use event_store::{AppendOptions, EventStore, InMemoryEventStore};

fn applicant() -> Applicant {
    Applicant::new("Bench Storage", "f1benchstorage", "bench")
}

fn kyc() -> KycResult {
    KycResult {
        provider: "bench".to_string(),
        reference: "kyc-bench".to_string(),
        score: None,
    }
}

/// Stores an application in RKH approval with `updates` approval events on top.
fn seed_history(rt: &tokio::runtime::Runtime, store: &InMemoryEventStore, updates: u64) -> AggregateId {
    let id = AggregateId::generate();
    let repository: EventSourcedRepository<_, DatacapAllocator> =
        EventSourcedRepository::new(store.clone());

    rt.block_on(async {
        let mut application = DatacapAllocator::default();
        application.create(id.clone(), applicant()).unwrap();
        application.approve_kyc(kyc()).unwrap();
        application
            .update_allocation_instructions(AllocationInstructions {
                methods: vec!["RKH".to_string()],
                amounts: vec![1_000],
            })
            .unwrap();
        application.approve_governance_review(u32::MAX).unwrap();
        for message_id in 0..updates {
            application
                .update_rkh_approvals(message_id, vec![format!("f1signer{message_id}")])
                .unwrap();
        }
        repository
            .save(&mut application, AppendOptions::expect_new())
            .await
            .unwrap();
    });

    id
}

fn bench_create_application(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("domain/create_application", |b| {
        b.iter(|| {
            rt.block_on(async {
                let service =
                    ApplicationService::new(InMemoryEventStore::new(), ApplicationConfig::default());
                service
                    .execute(ApplicationCommand::create(AggregateId::generate(), applicant()))
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_full_command_cycle(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("domain/create_kyc_governance_approve", |b| {
        b.iter(|| {
            rt.block_on(async {
                let service =
                    ApplicationService::new(InMemoryEventStore::new(), ApplicationConfig::default());
                let id = AggregateId::generate();
                for command in [
                    ApplicationCommand::create(id.clone(), applicant()),
                    ApplicationCommand::approve_kyc(id.clone(), kyc()),
                    ApplicationCommand::update_allocation_instructions(
                        id.clone(),
                        AllocationInstructions {
                            methods: vec!["META_ALLOCATOR".to_string()],
                            amounts: vec![500],
                        },
                    ),
                    ApplicationCommand::approve_governance_review(id.clone()),
                    ApplicationCommand::complete_meta_allocator_approval(id.clone(), 1, "0xbench"),
                ] {
                    service.execute(command).await.unwrap();
                }
            });
        });
    });
}

fn bench_replay(c: &mut Criterion, updates: u64) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryEventStore::new();
    let id = seed_history(&rt, &store, updates);

    c.bench_function(&format!("domain/replay_{updates}_approval_updates"), |b| {
        b.iter(|| {
            rt.block_on(async {
                let history = store.get_events_for_aggregate(&id).await.unwrap();
                let mut application = DatacapAllocator::default();
                application.load_from_history(&history).unwrap();
            });
        });
    });
}

fn bench_replay_50(c: &mut Criterion) {
    bench_replay(c, 50);
}

fn bench_replay_100(c: &mut Criterion) {
    bench_replay(c, 100);
}

criterion_group!(
    benches,
    bench_create_application,
    bench_full_command_cycle,
    bench_replay_50,
    bench_replay_100,
);
criterion_main!(benches);
