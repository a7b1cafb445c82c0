#![cfg(loom)]

use loom::thread;
use tasks::StopSource;

#[test]
fn request_stop_single_winner() {
    loom::model(|| {
        let source = StopSource::new();
        let copy = source.clone();

        let handle = thread::spawn(move || copy.request_stop());

        let won_here = source.request_stop();
        let won_there = handle.join().unwrap();

        assert_ne!(won_here, won_there);
        assert!(source.stop_requested());
    });
}

#[test]
fn token_observes_stop() {
    loom::model(|| {
        let source = StopSource::new();
        let token = source.token();

        let handle = thread::spawn(move || {
            source.request_stop();
        });

        handle.join().unwrap();
        assert!(token.stop_requested());
        assert!(token.stop_possible());
    });
}

#[test]
fn source_drop_releases_requestability() {
    loom::model(|| {
        let source = StopSource::new();
        let token = source.token();

        let handle = thread::spawn(move || {
            drop(source);
        });

        handle.join().unwrap();
        assert!(!token.stop_possible());
    });
}
