use grottoproto::{Direction, Location, RoomView};

use crate::items::Item;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorldError {
    #[error("area {0:?} not found")]
    UnknownArea(String),
    #[error("room {room:?} not found in area {area:?}")]
    UnknownRoom { area: String, room: String },
    #[error("duplicate area {0:?}")]
    DuplicateArea(String),
    #[error("duplicate room {room:?} in area {area:?}")]
    DuplicateRoom { area: String, room: String },
    #[error("direction {direction} is not on a {compass} compass")]
    OffCompass {
        direction: Direction,
        compass: Compass,
    },
    #[error("cannot link {room} {direction} to {to}: already linked to {existing}")]
    LinkConflict {
        room: String,
        direction: Direction,
        to: String,
        existing: String,
    },
    #[error("area {area:?} uses a {got} compass, world uses {want}")]
    CompassMismatch {
        area: String,
        want: Compass,
        got: Compass,
    },
}

/// The set of directions rooms may be linked in.
///
/// Also fixes the width of every room's exit table: one slot per direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Compass {
    Four,
    Eight,
}

const FOUR: [Direction; 4] = [Direction::N, Direction::E, Direction::S, Direction::W];

impl Compass {
    pub fn directions(self) -> &'static [Direction] {
        match self {
            Compass::Four => &FOUR,
            Compass::Eight => &Direction::ALL,
        }
    }

    pub fn width(self) -> usize {
        self.directions().len()
    }

    /// Exit table index for `d`, if `d` is on this compass.
    pub fn slot(self, d: Direction) -> Option<usize> {
        self.directions().iter().position(|x| *x == d)
    }

    /// Both compasses are closed under `opposite`, so this never leaves the table.
    pub fn opposite(self, d: Direction) -> Direction {
        d.opposite()
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "4" | "four" => Some(Compass::Four),
            "8" | "eight" => Some(Compass::Eight),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Compass::Four => "4-point",
            Compass::Eight => "8-point",
        }
    }
}

impl std::fmt::Display for Compass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct Room {
    pub id: String,
    pub short: String,
    pub long: String,
    compass: Compass,
    exits: Vec<Option<String>>,
}

impl Room {
    fn new(id: String, short: String, long: String, compass: Compass) -> Self {
        Self {
            id,
            short,
            long,
            compass,
            exits: vec![None; compass.width()],
        }
    }

    /// Neighbor in direction `d`. Directions off the compass have no neighbor.
    pub fn exit(&self, d: Direction) -> Option<&str> {
        let i = self.compass.slot(d)?;
        self.exits[i].as_deref()
    }

    pub fn exits(&self) -> Vec<Direction> {
        self.compass
            .directions()
            .iter()
            .zip(&self.exits)
            .filter(|(_, to)| to.is_some())
            .map(|(d, _)| *d)
            .collect()
    }

    fn check_free(&self, slot: usize, d: Direction, target: &str) -> Result<(), WorldError> {
        match self.exits[slot].as_deref() {
            Some(existing) if existing != target => Err(WorldError::LinkConflict {
                room: self.id.clone(),
                direction: d,
                to: target.to_string(),
                existing: existing.to_string(),
            }),
            _ => Ok(()),
        }
    }

    pub fn view(&self) -> RoomView {
        RoomView {
            id: self.id.clone(),
            short: self.short.clone(),
            long: self.long.clone(),
            exits: self.exits(),
        }
    }
}

impl std::fmt::Display for Room {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.id, self.short)
    }
}

#[derive(Debug, Clone)]
pub struct Area {
    pub id: String,
    pub title: String,
    compass: Compass,
    rooms: Vec<Room>,
}

impl Area {
    pub fn new(id: impl Into<String>, title: impl Into<String>, compass: Compass) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            compass,
            rooms: Vec::new(),
        }
    }

    pub fn compass(&self) -> Compass {
        self.compass
    }

    pub fn rooms(&self) -> &[Room] {
        &self.rooms
    }

    pub fn add_room(
        &mut self,
        id: impl Into<String>,
        short: impl Into<String>,
        long: impl Into<String>,
    ) -> Result<(), WorldError> {
        let id = id.into();
        if self.rooms.iter().any(|r| r.id == id) {
            return Err(WorldError::DuplicateRoom {
                area: self.id.clone(),
                room: id,
            });
        }
        self.rooms
            .push(Room::new(id, short.into(), long.into(), self.compass));
        Ok(())
    }

    pub fn room(&self, id: &str) -> Result<&Room, WorldError> {
        self.rooms
            .iter()
            .find(|r| r.id == id)
            .ok_or_else(|| self.unknown_room(id))
    }

    fn index_of(&self, id: &str) -> Result<usize, WorldError> {
        self.rooms
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| self.unknown_room(id))
    }

    fn unknown_room(&self, id: &str) -> WorldError {
        WorldError::UnknownRoom {
            area: self.id.clone(),
            room: id.to_string(),
        }
    }

    /// Link `from` to `to` going `d`, and `to` back to `from` going the
    /// opposite way.
    ///
    /// Linking an already linked pair again is a no-op. Overwriting an
    /// existing exit on either side is a [`WorldError::LinkConflict`] and
    /// leaves both rooms untouched.
    pub fn link(&mut self, from: &str, d: Direction, to: &str) -> Result<(), WorldError> {
        let back = self.compass.opposite(d);
        let (Some(fwd_slot), Some(back_slot)) = (self.compass.slot(d), self.compass.slot(back))
        else {
            return Err(WorldError::OffCompass {
                direction: d,
                compass: self.compass,
            });
        };
        let fi = self.index_of(from)?;
        let ti = self.index_of(to)?;

        self.rooms[fi].check_free(fwd_slot, d, to)?;
        self.rooms[ti].check_free(back_slot, back, from)?;

        self.rooms[fi].exits[fwd_slot] = Some(to.to_string());
        self.rooms[ti].exits[back_slot] = Some(from.to_string());
        Ok(())
    }

    /// Link several neighbors of `from` at once.
    pub fn link_all(&mut self, from: &str, links: &[(Direction, &str)]) -> Result<(), WorldError> {
        for (d, to) in links {
            self.link(from, *d, to)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct World {
    compass: Compass,
    areas: Vec<Area>,
    spawn: Location,
    items: Vec<Item>,
}

impl World {
    pub fn new(compass: Compass) -> Self {
        Self {
            compass,
            areas: Vec::new(),
            spawn: Location::default(),
            items: Vec::new(),
        }
    }

    pub fn compass(&self) -> Compass {
        self.compass
    }

    pub fn areas(&self) -> &[Area] {
        &self.areas
    }

    /// Where new characters appear. Defaults to the first room of the first area.
    pub fn spawn(&self) -> &Location {
        &self.spawn
    }

    pub fn add_area(&mut self, area: Area) -> Result<(), WorldError> {
        if area.compass != self.compass {
            return Err(WorldError::CompassMismatch {
                area: area.id,
                want: self.compass,
                got: area.compass,
            });
        }
        if self.areas.iter().any(|a| a.id == area.id) {
            return Err(WorldError::DuplicateArea(area.id));
        }
        if self.spawn.area.is_empty() {
            if let Some(first) = area.rooms.first() {
                self.spawn = Location::new(area.id.clone(), first.id.clone());
            }
        }
        self.areas.push(area);
        Ok(())
    }

    pub fn area(&self, id: &str) -> Result<&Area, WorldError> {
        self.areas
            .iter()
            .find(|a| a.id == id)
            .ok_or_else(|| WorldError::UnknownArea(id.to_string()))
    }

    pub fn room_at(&self, loc: &Location) -> Result<&Room, WorldError> {
        self.area(&loc.area)?.room(&loc.room)
    }

    /// Where going `d` from `loc` leads, if anywhere.
    pub fn neighbor(&self, loc: &Location, d: Direction) -> Result<Option<Location>, WorldError> {
        let room = self.room_at(loc)?;
        Ok(room
            .exit(d)
            .map(|to| Location::new(loc.area.clone(), to)))
    }

    /// Drop `count` of `name` at `loc`, merging with a pile already there.
    pub fn place_item(
        &mut self,
        loc: Location,
        name: &str,
        count: u32,
    ) -> Result<(), WorldError> {
        self.room_at(&loc)?;
        let item = Item::new(name, count).at(loc);
        match self
            .items
            .iter_mut()
            .find(|i| i.location == item.location && i.name == item.name)
        {
            Some(pile) => pile.count = pile.count.saturating_add(item.count),
            None => self.items.push(item),
        }
        Ok(())
    }

    pub fn items_at(&self, loc: &Location) -> impl Iterator<Item = &Item> {
        self.items
            .iter()
            .filter(move |i| i.location.as_ref() == Some(loc))
    }

    /// Remove a loose item at `loc` by case-insensitive name.
    pub fn take_item(&mut self, loc: &Location, name: &str) -> Option<Item> {
        let i = self
            .items
            .iter()
            .position(|i| i.location.as_ref() == Some(loc) && i.name_matches(name))?;
        let mut item = self.items.remove(i);
        item.location = None;
        Some(item)
    }

    /// Three rooms in a row: `01` -N-> `02` -E-> `03`.
    pub fn cave(compass: Compass) -> Result<Self, WorldError> {
        let mut a = Area::new("a1", "Hidden Cave", compass);
        a.add_room(
            "01",
            "Cave entrance",
            "Hidden behind bushes the opening is barely visible.",
        )?;
        a.add_room(
            "02",
            "Fire room",
            "A thin streak of light falls through a hole in the ceiling. \
             The entrance is a dark patch on the south wall.",
        )?;
        a.add_room("03", "Small chamber", "")?;
        a.link("01", Direction::N, "02")?;
        a.link("02", Direction::E, "03")?;

        let mut w = World::new(compass);
        w.add_area(a)?;
        w.place_item(Location::new("a1", "02"), "torch", 1)?;
        w.place_item(Location::new("a1", "03"), "flint", 2)?;
        Ok(w)
    }

    /// Nine staterooms around a center room. Needs an eight-point compass.
    pub fn spaceport(compass: Compass) -> Result<Self, WorldError> {
        use Direction::*;

        let mut a = Area::new("sp", "Spaceport", compass);
        let rooms = [
            ("01", "Center stateroom"),
            ("02", "South stateroom"),
            ("03", "South-west stateroom"),
            ("04", "West stateroom"),
            ("05", "North-west stateroom"),
            ("06", "North stateroom"),
            ("07", "North-east stateroom"),
            ("08", "East stateroom"),
            ("09", "South-east stateroom"),
        ];
        for (id, short) in rooms {
            a.add_room(id, short, "")?;
        }
        a.link_all("01", &[(S, "02"), (SW, "03"), (W, "04"), (NW, "05"), (N, "06")])?;
        a.link("02", W, "03")?;
        a.link("03", N, "04")?;
        a.link("04", N, "05")?;
        a.link("05", E, "06")?;
        a.link("06", E, "07")?;
        a.link("07", S, "08")?;
        a.link("08", S, "09")?;

        let mut w = World::new(compass);
        w.add_area(a)?;
        w.place_item(Location::new("sp", "08"), "credit", 25)?;
        Ok(w)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_rooms(compass: Compass) -> Area {
        let mut a = Area::new("t", "Test", compass);
        a.add_room("t1", "one", "").unwrap();
        a.add_room("t2", "two", "").unwrap();
        a.add_room("t3", "three", "").unwrap();
        a
    }

    #[test]
    fn link_sets_both_sides() {
        let mut a = two_rooms(Compass::Eight);
        for d in Direction::ALL {
            let mut a = a.clone();
            a.link("t1", d, "t2").unwrap();
            assert_eq!(a.room("t1").unwrap().exit(d), Some("t2"));
            assert_eq!(a.room("t2").unwrap().exit(d.opposite()), Some("t1"));
        }
        a.link("t1", Direction::N, "t2").unwrap();
        assert_eq!(a.room("t1").unwrap().exits(), vec![Direction::N]);
        assert_eq!(a.room("t2").unwrap().exits(), vec![Direction::S]);
    }

    #[test]
    fn relink_same_target_is_a_noop() {
        let mut a = two_rooms(Compass::Four);
        a.link("t1", Direction::N, "t2").unwrap();
        a.link("t1", Direction::N, "t2").unwrap();
        a.link("t2", Direction::S, "t1").unwrap();
        assert_eq!(a.room("t1").unwrap().exit(Direction::N), Some("t2"));
    }

    #[test]
    fn relink_different_target_fails_without_side_effects() {
        let mut a = two_rooms(Compass::Four);
        a.link("t1", Direction::N, "t2").unwrap();
        let err = a.link("t1", Direction::N, "t3").unwrap_err();
        assert!(matches!(err, WorldError::LinkConflict { ref existing, .. } if existing == "t2"));
        assert_eq!(a.room("t3").unwrap().exit(Direction::S), None);

        // t2's south slot is taken by t1, so t3 cannot claim it from the other side.
        let err = a.link("t3", Direction::N, "t2").unwrap_err();
        assert!(matches!(err, WorldError::LinkConflict { ref room, .. } if room == "t2"));
        assert_eq!(a.room("t3").unwrap().exit(Direction::N), None);
    }

    #[test]
    fn link_off_compass_or_to_unknown_room_fails() {
        let mut a = two_rooms(Compass::Four);
        assert!(matches!(
            a.link("t1", Direction::NE, "t2"),
            Err(WorldError::OffCompass { .. })
        ));
        assert!(matches!(
            a.link("t1", Direction::N, "nope"),
            Err(WorldError::UnknownRoom { .. })
        ));
        assert_eq!(a.room("t1").unwrap().exit(Direction::NE), None);
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut a = two_rooms(Compass::Four);
        assert!(matches!(
            a.add_room("t1", "again", ""),
            Err(WorldError::DuplicateRoom { .. })
        ));
        let mut w = World::new(Compass::Four);
        w.add_area(a.clone()).unwrap();
        assert!(matches!(w.add_area(a), Err(WorldError::DuplicateArea(_))));
        assert!(matches!(
            w.add_area(Area::new("x", "X", Compass::Eight)),
            Err(WorldError::CompassMismatch { .. })
        ));
    }

    #[test]
    fn cave_layout() {
        let w = World::cave(Compass::Four).unwrap();
        assert_eq!(w.spawn(), &Location::new("a1", "01"));
        let at = |room: &str| Location::new("a1", room);
        assert_eq!(w.neighbor(&at("01"), Direction::N).unwrap(), Some(at("02")));
        assert_eq!(w.neighbor(&at("02"), Direction::E).unwrap(), Some(at("03")));
        assert_eq!(w.neighbor(&at("02"), Direction::S).unwrap(), Some(at("01")));
        assert_eq!(w.neighbor(&at("03"), Direction::W).unwrap(), Some(at("02")));
        assert_eq!(w.neighbor(&at("01"), Direction::W).unwrap(), None);
        assert!(w.area("nope").is_err());
        assert!(w.room_at(&at("99")).is_err());
    }

    #[test]
    fn spaceport_needs_eight_points() {
        assert!(matches!(
            World::spaceport(Compass::Four),
            Err(WorldError::OffCompass { .. })
        ));
        let w = World::spaceport(Compass::Eight).unwrap();
        let center = w.room_at(&Location::new("sp", "01")).unwrap();
        assert_eq!(center.exit(Direction::SW), Some("03"));
        let sw = w.room_at(&Location::new("sp", "03")).unwrap();
        assert_eq!(sw.exit(Direction::NE), Some("01"));
    }

    #[test]
    fn items_are_placed_and_taken_by_name() {
        let mut w = World::cave(Compass::Four).unwrap();
        let loc = Location::new("a1", "03");
        w.place_item(loc.clone(), "Flint", 1).unwrap();
        assert_eq!(w.items_at(&loc).map(|i| i.count).sum::<u32>(), 3);

        let got = w.take_item(&loc, "FLINT").unwrap();
        assert_eq!(got.count, 3);
        assert!(got.location.is_none());
        assert!(w.take_item(&loc, "flint").is_none());
        assert!(w.place_item(Location::new("a1", "zz"), "x", 1).is_err());
    }
}
