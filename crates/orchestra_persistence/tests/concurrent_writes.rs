use orchestra_persistence::db::migrations::upgrade;
use orchestra_persistence::{
    open_engine_in_memory, Context, Crud, Engine, EngineConfig, ErrorPolicy,
};
use std::thread;

const THREADS: usize = 8;
const WRITES_PER_THREAD: usize = 25;

#[test]
fn in_memory_engine_accepts_writes_from_many_threads() {
    let engine = open_engine_in_memory().unwrap();

    let failures: Vec<String> = thread::scope(|scope| {
        let workers: Vec<_> = (0..THREADS)
            .map(|thread_index| {
                let engine = &engine;
                scope.spawn(move || {
                    (0..WRITES_PER_THREAD)
                        .filter_map(|write_index| {
                            Context::new(
                                format!("t{thread_index}-{write_index}"),
                                "created",
                                "/t.yaml",
                                "{}",
                            )
                            .save(engine)
                            .err()
                            .map(|err| err.to_string())
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        workers
            .into_iter()
            .flat_map(|worker| worker.join().unwrap())
            .collect()
    });

    assert!(failures.is_empty(), "writes failed: {failures:?}");
    assert_eq!(
        Context::list(&engine).unwrap().len(),
        THREADS * WRITES_PER_THREAD
    );
}

#[test]
fn lenient_in_memory_engine_does_not_drop_concurrent_writes() {
    let engine =
        Engine::open(EngineConfig::memory().with_error_policy(ErrorPolicy::Lenient)).unwrap();
    upgrade(&engine).unwrap();

    thread::scope(|scope| {
        for thread_index in 0..THREADS {
            let engine = &engine;
            scope.spawn(move || {
                for write_index in 0..WRITES_PER_THREAD {
                    Context::new(
                        format!("t{thread_index}-{write_index}"),
                        "created",
                        "/t.yaml",
                        "{}",
                    )
                    .save(engine)
                    .unwrap();
                }
            });
        }
    });

    assert_eq!(
        Context::list(&engine).unwrap().len(),
        THREADS * WRITES_PER_THREAD
    );
}
