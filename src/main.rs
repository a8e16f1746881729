//! Walkthrough of the objects model
//!
//! Declares a few interfaces and objects, then exercises the three base
//! operations: acquire, release and query. Set `RUST_LOG=objects=trace` to see
//! table construction and object destruction.

use objects::proc::{implement, interface, object};
use objects::{IObject, Iid, Object, ObjectBase, Ref};
use tracing_subscriber::EnvFilter;

// =============================================================================
// Interfaces
// =============================================================================

#[interface("demo.IAnimal")]
pub trait IAnimal {
    fn speak(&self);
    fn legs(&self) -> i32;
}

#[interface("demo.ISwimmer")]
pub trait ISwimmer {
    fn swim(&self, meters: u32) -> u32;
}

#[interface("demo.IFlyer")]
pub trait IFlyer {
    fn fly(&self);
}

// =============================================================================
// Objects
// =============================================================================

#[object(IAnimal)]
pub struct Dog {
    name: &'static str,
}

#[implement(IAnimal)]
impl Dog {
    fn speak(&self) {
        println!("  {} says: Woof!", self.name);
    }

    fn legs(&self) -> i32 {
        4
    }
}

impl Drop for Dog {
    fn drop(&mut self) {
        println!("  {} is gone", self.name);
    }
}

#[object(IAnimal, ISwimmer, IFlyer)]
pub struct Duck {
    name: &'static str,
}

#[implement(IAnimal)]
impl Duck {
    fn speak(&self) {
        println!("  {} says: Quack!", self.name);
    }

    fn legs(&self) -> i32 {
        2
    }
}

#[implement(ISwimmer)]
impl Duck {
    fn swim(&self, meters: u32) -> u32 {
        println!("  {} is swimming {}m", self.name, meters);
        meters * 2
    }
}

#[implement(IFlyer)]
impl Duck {
    fn fly(&self) {
        println!("  {} is flying!", self.name);
    }
}

impl Drop for Duck {
    fn drop(&mut self) {
        println!("  {} is gone", self.name);
    }
}

fn describe(animal: &Ref<IAnimal>) {
    animal.speak();
    println!("  legs: {}", animal.legs());

    match animal.query::<ISwimmer>() {
        Some(swimmer) => println!("  strokes: {}", swimmer.swim(10)),
        None => println!("  cannot swim"),
    }
    match animal.query::<IFlyer>() {
        Some(flyer) => flyer.fly(),
        None => println!("  cannot fly"),
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== objects walkthrough ===\n");

    // =========================================================================
    // Discovery through a shared base interface
    // =========================================================================
    println!("--- Query ---");

    let dog = Object::new(Dog {
        vtable_i_animal: Dog::VTABLE_I_ANIMAL,
        name: "Buddy",
    });
    let duck = Object::new(Duck {
        vtable_i_animal: Duck::VTABLE_I_ANIMAL,
        vtable_i_swimmer: Duck::VTABLE_I_SWIMMER,
        vtable_i_flyer: Duck::VTABLE_I_FLYER,
        name: "Donald",
    });

    let animals: Vec<Ref<IAnimal>> = [dog.query::<IAnimal>(), duck.query::<IAnimal>()]
        .into_iter()
        .flatten()
        .collect();
    for animal in &animals {
        describe(animal);
    }

    // =========================================================================
    // Reference counts
    // =========================================================================
    println!("\n--- Reference counts ---");
    println!("  dog:  {}", dog.ref_count());
    println!("  duck: {}", duck.ref_count());

    let by_iid = duck.query_iid(&Iid::new("demo.IFlyer"));
    println!(
        "  query demo.IFlyer by identifier: {}",
        if by_iid.is_some() { "found" } else { "missing" }
    );
    println!("  duck after query: {}", duck.ref_count());
    drop(by_iid);

    // =========================================================================
    // Identity
    // =========================================================================
    println!("\n--- Identity ---");
    if let (Some(swimmer), Some(flyer)) = (duck.query::<ISwimmer>(), duck.query::<IFlyer>()) {
        println!("  swimmer and flyer are one object: {}", swimmer.same_object(&flyer));
        println!("  duck and dog are one object: {}", swimmer.same_object(&animals[0]));
    }
    let table = Duck::interface_table();
    for entry in table.entries() {
        println!("  {} -> {:#x}", entry.iid, entry.offset);
    }
    let base: Ref<IObject> = duck.to_object();
    println!("  primary sub-object: {:p}", base.as_ptr());

    // =========================================================================
    // Teardown: the last release destroys each object
    // =========================================================================
    println!("\n--- Teardown ---");
    drop(base);
    drop(animals);
    println!("  handles dropped, dog: {}, duck: {}", dog.ref_count(), duck.ref_count());
    drop(dog);
    drop(duck);

    tracing::info!("walkthrough finished");
    println!("\n=== done ===");
}
