use grottoproto::{ItemView, Location};

/// Title-case every word: `"fire rock"` -> `"Fire Rock"`.
pub fn normalize_name(s: &str) -> String {
    s.split_whitespace()
        .map(|w| {
            let mut cs = w.chars();
            match cs.next() {
                Some(c) => c.to_uppercase().chain(cs.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub name: String,
    pub count: u32,
    /// Set while the item lies in the world, unset while carried.
    pub location: Option<Location>,
}

impl Item {
    pub fn new(name: &str, count: u32) -> Self {
        Self {
            name: normalize_name(name),
            count,
            location: None,
        }
    }

    pub fn at(mut self, loc: Location) -> Self {
        self.location = Some(loc);
        self
    }

    pub fn name_matches(&self, token: &str) -> bool {
        self.name.eq_ignore_ascii_case(&normalize_name(token))
    }

    pub fn view(&self) -> ItemView {
        ItemView {
            name: self.name.clone(),
            count: self.count,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inventory {
    items: Vec<Item>,
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// What every new player carries.
    pub fn starter() -> Self {
        let mut inv = Self::new();
        inv.add("credit", 200);
        inv.add("communicator", 1);
        inv.add("digipass", 1);
        inv
    }

    /// Add `count` of `name`, merging with an entry of the same name.
    pub fn add(&mut self, name: &str, count: u32) {
        let item = Item::new(name, count);
        match self.items.iter_mut().find(|i| i.name == item.name) {
            Some(have) => have.count = have.count.saturating_add(count),
            None => self.items.push(item),
        }
    }

    pub fn find(&self, token: &str) -> Option<&Item> {
        self.items.iter().find(|i| i.name_matches(token))
    }

    pub fn views(&self) -> Vec<ItemView> {
        self.items.iter().map(Item::view).collect()
    }
}
