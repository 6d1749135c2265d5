//! The demo object model the host registers with the persistence core.
//!
//! Three dynamic classes (rooms, props, actors) cross-link into cycles —
//! rooms exit into each other, an actor carries props that point back at
//! their holder — and one persistent singleton carries session state. Every
//! stream transfer helper gets exercised somewhere in here.

use std::cell::RefCell;
use std::rc::Rc;

use anyhow::{anyhow, Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};

use mirage_persist::{ClassRegistry, ObjRef, Persistable, PersistError, PersistStream, SharedObject};

#[derive(Default)]
pub struct Room {
    pub name: String,
    pub ambient_track: Option<String>,
    pub scale: f32,
    pub exits: Vec<ObjRef>,
    pub props: Vec<ObjRef>,
}

impl Persistable for Room {
    fn class_name(&self) -> &'static str {
        "Room"
    }

    fn persist(&mut self, stream: &mut PersistStream) -> Result<(), PersistError> {
        stream.transfer_string("name", &mut self.name)?;
        stream.transfer_opt_string("ambient_track", &mut self.ambient_track)?;
        stream.transfer_f32("scale", &mut self.scale)?;
        transfer_ref_list(stream, "exits", &mut self.exits)?;
        transfer_ref_list(stream, "props", &mut self.props)
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

#[derive(Default)]
pub struct Prop {
    pub name: String,
    pub weight: u32,
    pub holder: Option<ObjRef>,
}

impl Persistable for Prop {
    fn class_name(&self) -> &'static str {
        "Prop"
    }

    fn persist(&mut self, stream: &mut PersistStream) -> Result<(), PersistError> {
        stream.transfer_string("name", &mut self.name)?;
        stream.transfer_u32("weight", &mut self.weight)?;
        stream.transfer_ref("holder", &mut self.holder)
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

#[derive(Default)]
pub struct Actor {
    pub name: String,
    pub room: Option<ObjRef>,
    pub carried: Vec<ObjRef>,
    pub walk_speed: f64,
}

impl Persistable for Actor {
    fn class_name(&self) -> &'static str {
        "Actor"
    }

    fn persist(&mut self, stream: &mut PersistStream) -> Result<(), PersistError> {
        stream.transfer_string("name", &mut self.name)?;
        stream.transfer_ref("room", &mut self.room)?;
        transfer_ref_list(stream, "carried", &mut self.carried)?;
        stream.transfer_f64("walk_speed", &mut self.walk_speed)
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

/// Session-wide state. Persistent singleton: the one live instance
/// survives loads, only its fields are replaced.
#[derive(Default)]
pub struct GameState {
    pub current_room: Option<ObjRef>,
    pub play_time_ms: u32,
    pub difficulty: i32,
    pub subtitles: bool,
}

impl Persistable for GameState {
    fn class_name(&self) -> &'static str {
        "GameState"
    }

    fn persist(&mut self, stream: &mut PersistStream) -> Result<(), PersistError> {
        stream.transfer_ref("current_room", &mut self.current_room)?;
        stream.transfer_u32("play_time_ms", &mut self.play_time_ms)?;
        stream.transfer_i32("difficulty", &mut self.difficulty)?;
        stream.transfer_bool("subtitles", &mut self.subtitles)
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

/// A list of required links: count-prefixed, entries written through the
/// stream's link transfer. A dangling entry drops out on load with a
/// warning rather than poisoning the list.
fn transfer_ref_list(
    stream: &mut PersistStream,
    name: &'static str,
    list: &mut Vec<ObjRef>,
) -> Result<(), PersistError> {
    if stream.is_saving() {
        let mut count = list.len() as u32;
        stream.transfer_u32(name, &mut count)?;
        for handle in list.iter() {
            let mut slot = Some(*handle);
            stream.transfer_ref(name, &mut slot)?;
        }
    } else {
        let mut count = 0u32;
        stream.transfer_u32(name, &mut count)?;
        list.clear();
        for _ in 0..count {
            let mut slot = None;
            stream.transfer_ref(name, &mut slot)?;
            match slot {
                Some(handle) => list.push(handle),
                None => warn!("dropping dangling entry from {name}"),
            }
        }
    }
    Ok(())
}

/// Register every persistable class. Runs once at startup, before any
/// instance exists and before any save or load.
pub fn register_object_model(registry: &mut ClassRegistry) -> Result<()> {
    registry.register_class("GameState", true, None)?;
    registry.register_class("Room", false, Some(build_room))?;
    registry.register_class("Prop", false, Some(build_prop))?;
    registry.register_class("Actor", false, Some(build_actor))?;
    Ok(())
}

fn build_room() -> SharedObject {
    Rc::new(RefCell::new(Room::default()))
}

fn build_prop() -> SharedObject {
    Rc::new(RefCell::new(Prop::default()))
}

fn build_actor() -> SharedObject {
    Rc::new(RefCell::new(Actor::default()))
}

/// Create the session singleton. The load path needs it live before the
/// registry reads a save, so both save and load hosts call this right
/// after class registration.
pub fn create_session_state(registry: &mut ClassRegistry) -> Result<(SharedObject, ObjRef)> {
    let state: SharedObject = Rc::new(RefCell::new(GameState::default()));
    let handle = registry.add_instance(state.clone())?;
    Ok((state, handle))
}

/// Handles into the demo world graph.
#[derive(Debug)]
pub struct DemoWorld {
    pub office: ObjRef,
    pub alley: ObjRef,
    pub guide: ObjRef,
    pub lantern: ObjRef,
    pub ticket: ObjRef,
}

/// Build the demo graph: two rooms exiting into each other, an actor in
/// the office carrying a lantern that points back at him, and a loose
/// ticket on the alley floor.
pub fn build_demo_world(registry: &mut ClassRegistry, state: &SharedObject) -> Result<DemoWorld> {
    let office: SharedObject = Rc::new(RefCell::new(Room {
        name: "office".into(),
        ambient_track: Some("desk_hum".into()),
        scale: 1.0,
        exits: Vec::new(),
        props: Vec::new(),
    }));
    let alley: SharedObject = Rc::new(RefCell::new(Room {
        name: "alley".into(),
        ambient_track: None,
        scale: 0.75,
        exits: Vec::new(),
        props: Vec::new(),
    }));
    let guide: SharedObject = Rc::new(RefCell::new(Actor {
        name: "guide".into(),
        room: None,
        carried: Vec::new(),
        walk_speed: 1.5,
    }));
    let lantern: SharedObject = Rc::new(RefCell::new(Prop {
        name: "lantern".into(),
        weight: 3,
        holder: None,
    }));
    let ticket: SharedObject = Rc::new(RefCell::new(Prop {
        name: "ticket".into(),
        weight: 1,
        holder: None,
    }));

    let office_ref = registry.add_instance(office.clone())?;
    let alley_ref = registry.add_instance(alley.clone())?;
    let guide_ref = registry.add_instance(guide.clone())?;
    let lantern_ref = registry.add_instance(lantern.clone())?;
    let ticket_ref = registry.add_instance(ticket.clone())?;

    with_object::<Room>(&office, |room| {
        room.exits.push(alley_ref);
    })?;
    with_object::<Room>(&alley, |room| {
        room.exits.push(office_ref);
        room.props.push(ticket_ref);
    })?;
    with_object::<Actor>(&guide, |actor| {
        actor.room = Some(office_ref);
        actor.carried.push(lantern_ref);
    })?;
    with_object::<Prop>(&lantern, |prop| {
        prop.holder = Some(guide_ref);
    })?;
    with_object::<Prop>(&ticket, |prop| {
        prop.holder = Some(alley_ref);
    })?;
    with_object::<GameState>(state, |session| {
        session.current_room = Some(office_ref);
        session.play_time_ms = 125_000;
        session.difficulty = 2;
        session.subtitles = true;
    })?;

    Ok(DemoWorld {
        office: office_ref,
        alley: alley_ref,
        guide: guide_ref,
        lantern: lantern_ref,
        ticket: ticket_ref,
    })
}

fn with_object<T: 'static>(
    object: &SharedObject,
    mutate: impl FnOnce(&mut T),
) -> Result<()> {
    let mut guard = object.borrow_mut();
    let concrete = guard
        .as_any_mut()
        .downcast_mut::<T>()
        .ok_or_else(|| anyhow!("object is not the expected class"))?;
    mutate(concrete);
    Ok(())
}

// --- world reporting, used for JSON dumps and round-trip verification ---

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct RoomReport {
    pub name: String,
    pub ambient_track: Option<String>,
    pub scale: f32,
    pub exits: Vec<String>,
    pub props: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ActorReport {
    pub name: String,
    pub room: Option<String>,
    pub carried: Vec<String>,
    pub walk_speed: f64,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct PropReport {
    pub name: String,
    pub weight: u32,
    pub holder: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct StateReport {
    pub current_room: Option<String>,
    pub play_time_ms: u32,
    pub difficulty: i32,
    pub subtitles: bool,
}

/// Relationship-level snapshot of the live graph. Link handles flatten to
/// target names, so two isomorphic graphs produce equal reports no matter
/// what runtime ids they carry.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct WorldReport {
    pub rooms: Vec<RoomReport>,
    pub actors: Vec<ActorReport>,
    pub props: Vec<PropReport>,
    pub state: StateReport,
}

pub fn world_report(registry: &ClassRegistry) -> Result<WorldReport> {
    let mut rooms = Vec::new();
    for handle in registry.instances_of("Room") {
        let object = registry
            .resolve(handle)
            .ok_or_else(|| anyhow!("stale room handle"))?;
        let guard = object.borrow();
        let room = guard
            .as_any()
            .downcast_ref::<Room>()
            .ok_or_else(|| anyhow!("Room instance of the wrong class"))?;
        rooms.push(RoomReport {
            name: room.name.clone(),
            ambient_track: room.ambient_track.clone(),
            scale: room.scale,
            exits: names_of(registry, &room.exits),
            props: names_of(registry, &room.props),
        });
    }
    rooms.sort_by(|a, b| a.name.cmp(&b.name));

    let mut actors = Vec::new();
    for handle in registry.instances_of("Actor") {
        let object = registry
            .resolve(handle)
            .ok_or_else(|| anyhow!("stale actor handle"))?;
        let guard = object.borrow();
        let actor = guard
            .as_any()
            .downcast_ref::<Actor>()
            .ok_or_else(|| anyhow!("Actor instance of the wrong class"))?;
        actors.push(ActorReport {
            name: actor.name.clone(),
            room: actor.room.and_then(|r| display_name(registry, r)),
            carried: names_of(registry, &actor.carried),
            walk_speed: actor.walk_speed,
        });
    }
    actors.sort_by(|a, b| a.name.cmp(&b.name));

    let mut props = Vec::new();
    for handle in registry.instances_of("Prop") {
        let object = registry
            .resolve(handle)
            .ok_or_else(|| anyhow!("stale prop handle"))?;
        let guard = object.borrow();
        let prop = guard
            .as_any()
            .downcast_ref::<Prop>()
            .ok_or_else(|| anyhow!("Prop instance of the wrong class"))?;
        props.push(PropReport {
            name: prop.name.clone(),
            weight: prop.weight,
            holder: prop.holder.and_then(|h| display_name(registry, h)),
        });
    }
    props.sort_by(|a, b| a.name.cmp(&b.name));

    let state_handle = registry
        .instances_of("GameState")
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("session state singleton is missing"))?;
    let state_object = registry
        .resolve(state_handle)
        .ok_or_else(|| anyhow!("stale session state handle"))?;
    let state_guard = state_object.borrow();
    let state = state_guard
        .as_any()
        .downcast_ref::<GameState>()
        .context("GameState instance of the wrong class")?;

    Ok(WorldReport {
        rooms,
        actors,
        props,
        state: StateReport {
            current_room: state.current_room.and_then(|r| display_name(registry, r)),
            play_time_ms: state.play_time_ms,
            difficulty: state.difficulty,
            subtitles: state.subtitles,
        },
    })
}

fn names_of(registry: &ClassRegistry, handles: &[ObjRef]) -> Vec<String> {
    handles
        .iter()
        .filter_map(|&h| display_name(registry, h))
        .collect()
}

/// The display name of whatever a handle points at.
fn display_name(registry: &ClassRegistry, handle: ObjRef) -> Option<String> {
    let object = registry.resolve(handle)?;
    let guard = object.borrow();
    let any = guard.as_any();
    if let Some(room) = any.downcast_ref::<Room>() {
        return Some(room.name.clone());
    }
    if let Some(prop) = any.downcast_ref::<Prop>() {
        return Some(prop.name.clone());
    }
    if let Some(actor) = any.downcast_ref::<Actor>() {
        return Some(actor.name.clone());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirage_persist::PersistStream;

    #[test]
    fn demo_world_report_captures_the_cycles() -> Result<()> {
        let mut registry = ClassRegistry::new();
        register_object_model(&mut registry)?;
        let (state, _) = create_session_state(&mut registry)?;
        build_demo_world(&mut registry, &state)?;

        let report = world_report(&registry)?;
        assert_eq!(report.rooms.len(), 2);
        assert_eq!(report.rooms[0].name, "alley");
        assert_eq!(report.rooms[0].exits, ["office"]);
        assert_eq!(report.rooms[1].exits, ["alley"]);
        assert_eq!(report.actors[0].carried, ["lantern"]);
        assert_eq!(report.props[0].holder.as_deref(), Some("guide"));
        assert_eq!(report.state.current_room.as_deref(), Some("office"));
        Ok(())
    }

    #[test]
    fn world_report_is_stable_across_a_round_trip() -> Result<()> {
        let mut registry = ClassRegistry::new();
        register_object_model(&mut registry)?;
        let (state, _) = create_session_state(&mut registry)?;
        build_demo_world(&mut registry, &state)?;
        let before = world_report(&registry)?;

        let mut out = PersistStream::for_save("round trip", None);
        registry.save(&mut out)?;
        let mut back = PersistStream::for_load(out.into_bytes())?;
        registry.load(&mut back)?;

        let after = world_report(&registry)?;
        assert_eq!(before, after);
        Ok(())
    }
}
