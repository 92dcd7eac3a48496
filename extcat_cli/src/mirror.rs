use kube::api::{Meta, WatchEvent};

use extcat_definitions::LiferayExtension;

use super::FingerprintStore;

/// Event driven mirror of the extension collection.
///
/// Closes the watcher's write loop without putting the cluster api on the
/// scan hot path: the watcher only stops retrying an upsert once the
/// resulting cluster event has flowed back through here.
#[derive(Clone)]
pub struct CrMirror {
    store: FingerprintStore,
}

impl CrMirror {
    pub fn new(store: FingerprintStore) -> Self {
        CrMirror { store }
    }

    pub fn observe(&self, event: &WatchEvent<LiferayExtension>) {
        match event {
            WatchEvent::Added(lex) | WatchEvent::Modified(lex) => {
                if !lex.spec.zip_hash.is_empty() {
                    self.store.set(&Meta::name(lex), &lex.spec.zip_hash);
                }
            }
            WatchEvent::Deleted(lex) => {
                self.store.remove(&Meta::name(lex));
            }
            _ => (),
        }
    }
}
