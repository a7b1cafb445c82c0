#![cfg(loom)]

use executor::park::Parker;
use loom::sync::Arc;
use loom::thread;

#[test]
fn smoke() {
    loom::model(|| {
        let parker = Arc::new(Parker::new());
        let unparker = parker.clone();

        thread::spawn(move || {
            parker.park();
        });

        unparker.unpark();
    });
}

#[test]
fn unpark_is_not_lost() {
    loom::model(|| {
        let parker = Arc::new(Parker::new());
        let unparker = parker.clone();

        let handle = thread::spawn(move || {
            unparker.unpark();
        });

        parker.park();
        handle.join().unwrap();
    });
}
