//! The class registry: the only authority mapping live objects to the
//! integer ids a save image stores.
//!
//! One [`ClassRegistry`] is constructed by the host at startup and passed to
//! every persistence operation — there is no hidden global, so tests build a
//! fresh registry apiece. Classes register through an explicit startup call;
//! instances register as they are created and unregister as they die.
//!
//! Saving writes a class table (a directory of every class and its instance
//! ids) followed by every instance's field body. Loading mirrors it in
//! phases: reset the non-persistent instance sets, rebuild blank shell
//! instances from the table so every link target exists before any field is
//! read, then run each body against its shell. Persistent classes hold the
//! one singleton the process already owns; a load transplants the saved id
//! onto that instance instead of building a second one.

use std::any::Any;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::rc::Rc;

use log::{debug, warn};

use crate::stream::PersistStream;
use crate::PersistError;

/// A link to a registered object: the `(class, instance)` id pair that
/// stands in for a pointer, both in memory and on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjRef {
    pub class: u32,
    pub instance: u32,
}

/// An object the registry can track and round-trip.
pub trait Persistable: 'static {
    /// Registered class name. Must match the name the class registered
    /// under, and stays stable across builds — it is what save files store.
    fn class_name(&self) -> &'static str;

    /// Walk this object's fields through the stream, in one fixed order.
    /// The same body runs for save and load; the stream supplies direction.
    fn persist(&mut self, stream: &mut PersistStream) -> Result<(), PersistError>;

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Shared ownership handle for registered objects.
pub type SharedObject = Rc<RefCell<dyn Persistable>>;

/// Default-constructs a blank shell instance for the load path.
pub type BuildFn = fn() -> SharedObject;

struct InstanceEntry {
    object: SharedObject,
    saved_id: Option<u32>,
}

struct ClassEntry {
    name: String,
    id: u32,
    saved_id: Option<u32>,
    persistent: bool,
    build: Option<BuildFn>,
    /// Keyed by runtime id; ordered so saves are deterministic.
    instances: BTreeMap<u32, InstanceEntry>,
}

/// Process-wide (but explicitly owned) class and instance tables.
#[derive(Default)]
pub struct ClassRegistry {
    classes: Vec<ClassEntry>,
    names: HashMap<String, u32>,
    by_ptr: HashMap<*const (), ObjRef>,
    next_instance: u32,
}

fn ptr_key(object: &SharedObject) -> *const () {
    Rc::as_ptr(object) as *const ()
}

impl ClassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a persistable class under `name`.
    ///
    /// `persistent` marks a singleton class whose one instance lives for the
    /// whole process and survives loads. Non-persistent classes need `build`
    /// so the load path can shell-construct their saved instances.
    pub fn register_class(
        &mut self,
        name: &str,
        persistent: bool,
        build: Option<BuildFn>,
    ) -> Result<u32, PersistError> {
        if self.names.contains_key(name) {
            return Err(PersistError::DuplicateClass(name.to_string()));
        }
        let id = self.classes.len() as u32;
        self.classes.push(ClassEntry {
            name: name.to_string(),
            id,
            saved_id: None,
            persistent,
            build,
            instances: BTreeMap::new(),
        });
        self.names.insert(name.to_string(), id);
        Ok(id)
    }

    pub fn class_id(&self, name: &str) -> Option<u32> {
        self.names.get(name).copied()
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    /// Track a live object. Its class must already be registered.
    pub fn add_instance(&mut self, object: SharedObject) -> Result<ObjRef, PersistError> {
        let name = object.borrow().class_name();
        let class_id = self
            .names
            .get(name)
            .copied()
            .ok_or_else(|| PersistError::UnknownClass(name.to_string()))?;
        Ok(self.insert_instance(class_id, object, None))
    }

    /// Stop tracking an object. Returns false when the handle is stale.
    pub fn remove_instance(&mut self, handle: ObjRef) -> bool {
        let Some(class) = self.classes.get_mut(handle.class as usize) else {
            return false;
        };
        match class.instances.remove(&handle.instance) {
            Some(entry) => {
                self.by_ptr.remove(&ptr_key(&entry.object));
                true
            }
            None => false,
        }
    }

    pub fn resolve(&self, handle: ObjRef) -> Option<SharedObject> {
        self.classes
            .get(handle.class as usize)?
            .instances
            .get(&handle.instance)
            .map(|entry| entry.object.clone())
    }

    /// Pointer-identity lookup: the handle a live object registered under.
    pub fn ref_for(&self, object: &SharedObject) -> Option<ObjRef> {
        self.by_ptr.get(&ptr_key(object)).copied()
    }

    /// The saved id recovered for an instance by the last load, if any.
    pub fn saved_id_of(&self, handle: ObjRef) -> Option<u32> {
        self.classes
            .get(handle.class as usize)?
            .instances
            .get(&handle.instance)?
            .saved_id
    }

    pub fn live_count(&self, name: &str) -> usize {
        self.names
            .get(name)
            .map(|&id| self.classes[id as usize].instances.len())
            .unwrap_or(0)
    }

    /// Handles of every live instance of a class, in runtime-id order.
    pub fn instances_of(&self, name: &str) -> Vec<ObjRef> {
        let Some(&class_id) = self.names.get(name) else {
            return Vec::new();
        };
        self.classes[class_id as usize]
            .instances
            .keys()
            .map(|&instance| ObjRef {
                class: class_id,
                instance,
            })
            .collect()
    }

    fn insert_instance(
        &mut self,
        class_id: u32,
        object: SharedObject,
        saved_id: Option<u32>,
    ) -> ObjRef {
        let runtime_id = self.next_instance;
        self.next_instance += 1;
        let handle = ObjRef {
            class: class_id,
            instance: runtime_id,
        };
        self.by_ptr.insert(ptr_key(&object), handle);
        self.classes[class_id as usize]
            .instances
            .insert(runtime_id, InstanceEntry { object, saved_id });
        handle
    }

    /// Write the class table and every instance body into `stream`.
    pub fn save(&self, stream: &mut PersistStream) -> Result<(), PersistError> {
        self.save_with_progress(stream, &mut |_, _| {})
    }

    /// As [`save`](Self::save), reporting `(done, total)` after each
    /// instance body so a long save can keep the UI alive.
    pub fn save_with_progress(
        &self,
        stream: &mut PersistStream,
        progress: &mut dyn FnMut(usize, usize),
    ) -> Result<(), PersistError> {
        stream.put_u32(self.classes.len() as u32);
        for class in &self.classes {
            stream.put_string(&class.name);
            stream.put_u32(class.id);
            stream.put_u32(class.instances.len() as u32);
            for runtime_id in class.instances.keys() {
                stream.put_u32(*runtime_id);
            }
        }

        let total: usize = self.classes.iter().map(|c| c.instances.len()).sum();
        stream.put_u32(total as u32);

        let mut done = 0;
        for class in &self.classes {
            for (runtime_id, entry) in &class.instances {
                stream.put_u32(class.id);
                stream.put_u32(*runtime_id);
                let mark = stream.begin_len();
                entry.object.borrow_mut().persist(stream)?;
                stream.end_len(mark);
                done += 1;
                progress(done, total);
            }
        }
        debug!("saved {done} instance(s) across {} class(es)", self.classes.len());
        Ok(())
    }

    /// Rebuild the live object graph from `stream`.
    pub fn load(&mut self, stream: &mut PersistStream) -> Result<(), PersistError> {
        self.load_with_progress(stream, &mut |_, _| {})
    }

    pub fn load_with_progress(
        &mut self,
        stream: &mut PersistStream,
        progress: &mut dyn FnMut(usize, usize),
    ) -> Result<(), PersistError> {
        self.reset_for_load();

        // Table phase: every link target must exist, as a blank shell at
        // least, before any instance body is read.
        let class_count = stream.get_u32("class table count")?;
        let mut links: HashMap<(u32, u32), ObjRef> = HashMap::new();
        let mut skipped: HashSet<u32> = HashSet::new();

        for _ in 0..class_count {
            let name = stream.get_string("class name")?;
            let saved_class = stream.get_u32("class id")?;
            let count = stream.get_u32("class instance count")?;

            let Some(&class_id) = self.names.get(&name) else {
                warn!("save file lists class {name} this build does not register; skipping it");
                skipped.insert(saved_class);
                for _ in 0..count {
                    stream.get_u32("skipped instance id")?;
                }
                continue;
            };

            self.classes[class_id as usize].saved_id = Some(saved_class);

            if self.classes[class_id as usize].persistent {
                for index in 0..count {
                    let saved_instance = stream.get_u32("instance id")?;
                    if index > 0 {
                        warn!(
                            "persistent class {name} lists extra saved instance {saved_instance}; discarding"
                        );
                        continue;
                    }
                    let class = &mut self.classes[class_id as usize];
                    match class.instances.iter_mut().next() {
                        Some((&runtime_id, entry)) => {
                            entry.saved_id = Some(saved_instance);
                            links.insert(
                                (saved_class, saved_instance),
                                ObjRef {
                                    class: class_id,
                                    instance: runtime_id,
                                },
                            );
                        }
                        None => warn!(
                            "persistent class {name} has no live instance to adopt saved id {saved_instance}"
                        ),
                    }
                }
            } else {
                for _ in 0..count {
                    let saved_instance = stream.get_u32("instance id")?;
                    let build = self.classes[class_id as usize]
                        .build
                        .ok_or_else(|| PersistError::MissingBuilder(name.clone()))?;
                    let shell = build();
                    let handle = self.insert_instance(class_id, shell, Some(saved_instance));
                    links.insert((saved_class, saved_instance), handle);
                }
            }
        }

        stream.set_links(links);

        // Body phase: now that every target exists, field data can resolve
        // links in any direction, cycles included.
        let total = stream.get_u32("instance body count")?;
        for done in 0..total {
            let saved_class = stream.get_u32("instance class id")?;
            let saved_instance = stream.get_u32("instance id")?;
            let declared = stream.get_u32("instance body length")?;

            if skipped.contains(&saved_class) {
                stream.skip("skipped instance body", declared as usize)?;
                continue;
            }

            let handle = stream.link_for(saved_class, saved_instance).ok_or(
                PersistError::DanglingInstance {
                    class: saved_class,
                    instance: saved_instance,
                },
            )?;
            let object = self
                .resolve(handle)
                .ok_or(PersistError::DanglingInstance {
                    class: saved_class,
                    instance: saved_instance,
                })?;

            let start = stream.offset();
            object.borrow_mut().persist(stream)?;
            let read = (stream.offset() - start) as u32;
            if read != declared {
                return Err(PersistError::BodyMismatch {
                    class: saved_class,
                    instance: saved_instance,
                    declared,
                    read,
                });
            }
            progress(done as usize + 1, total as usize);
        }

        stream.clear_links();
        Ok(())
    }

    /// Start-of-load reset: non-persistent classes drop their live
    /// instances; persistent singletons survive with cleared bookkeeping.
    fn reset_for_load(&mut self) {
        let ClassRegistry {
            classes, by_ptr, ..
        } = self;
        for class in classes.iter_mut() {
            class.saved_id = None;
            if class.persistent {
                for entry in class.instances.values_mut() {
                    entry.saved_id = None;
                }
            } else {
                for entry in class.instances.values() {
                    by_ptr.remove(&ptr_key(&entry.object));
                }
                class.instances.clear();
            }
        }
    }
}
