//! Integration tests for dynamic subclassing

use moray_core::{
    ClassDescriptor, ClassFlags, ClassRef, ClassSlot, Invocation, OffsetSlot, Runtime,
    RuntimeError, RuntimeOptions, RuntimeResult, SandboxHost, Value, OBJ_HEADER_SIZE,
};
use std::sync::Arc;

fn speak(_inv: &Invocation<'_>) -> RuntimeResult<Value> {
    Ok(Value::from("..."))
}

fn speak_via_host(inv: &Invocation<'_>) -> RuntimeResult<Value> {
    inv.call_host("Speak")
}

fn walk(_inv: &Invocation<'_>) -> RuntimeResult<Value> {
    Ok(Value::from("walking"))
}

fn count_legs(_inv: &Invocation<'_>) -> RuntimeResult<Value> {
    Ok(Value::Int(4))
}

fn count_legs_via_host(inv: &Invocation<'_>) -> RuntimeResult<Value> {
    inv.call_host("Count_Legs")
}

fn setup(options: RuntimeOptions) -> (Arc<SandboxHost>, Runtime, ClassRef, ClassRef) {
    let host = Arc::new(SandboxHost::new());
    let runtime = Runtime::with_options(host.clone(), options);
    let (animal, dog) = (ClassSlot::new(), ClassSlot::new());
    let (speak_offset, walk_offset, legs_offset) =
        (OffsetSlot::new(), OffsetSlot::new(), OffsetSlot::new());
    let (dog_speak, dog_walk) = (OffsetSlot::new(), OffsetSlot::new());
    runtime.bootstrap(&[
        ClassDescriptor::new("Animal", &animal)
            .with_ivars_size(OBJ_HEADER_SIZE + 8)
            .novel_method_with_callback("Speak", speak, speak_via_host, &speak_offset)
            .novel_method("Walk", walk, &walk_offset),
        ClassDescriptor::new("Dog", &dog)
            .with_parent(&animal)
            .with_ivars_size(OBJ_HEADER_SIZE + 8)
            .inherited_method(&dog_speak, &speak_offset)
            .inherited_method(&dog_walk, &walk_offset)
            .novel_method_with_callback("Count_Legs", count_legs, count_legs_via_host, &legs_offset),
    ]);
    let animal = runtime.class("Animal").unwrap();
    let dog = runtime.class("Dog").unwrap();
    (host, runtime, animal, dog)
}

#[test]
fn test_martian_without_overrides_matches_parent() {
    let (host, runtime, animal, _dog) = setup(RuntimeOptions::default());
    host.declare_class("Martian", "Animal");

    let martian = runtime.singleton("Martian", None).unwrap();
    assert_eq!(martian.vtable(), animal.vtable());
    assert_eq!(martian.class_record_alloc_size(), animal.class_record_alloc_size());
    assert_eq!(martian.instance_alloc_size(), animal.instance_alloc_size());
    assert!(Arc::ptr_eq(&runtime.class("Martian").unwrap(), &martian));
    assert!(martian.flags().contains(ClassFlags::HOST_SUBCLASS));
    assert!(martian.fresh_methods().is_empty());
    assert_eq!(martian.parcel_id(), animal.parcel_id());
}

#[test]
fn test_second_request_returns_same_record() {
    let (host, runtime, _animal, _dog) = setup(RuntimeOptions::default());
    host.declare_class("Martian", "Animal");

    let first = runtime.singleton("Martian", None).unwrap();
    let second = runtime.singleton("Martian", None).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(host.registrations().len(), 1);
}

#[test]
fn test_explicit_parent_skips_host_lookup() {
    let (host, runtime, _animal, dog) = setup(RuntimeOptions::default());
    host.fail("find_parent_class", "should not be asked");

    let puppy = runtime.singleton("Puppy", Some(&dog)).unwrap();
    assert!(Arc::ptr_eq(puppy.parent().unwrap(), &dog));
    assert!(puppy.is_a("Animal"));
}

#[test]
fn test_overrides_only_touch_named_slots() {
    let (host, runtime, animal, dog) = setup(RuntimeOptions::default());
    host.declare_class("Robodog", "Dog");
    host.override_method("Robodog", "Speak", |_, _| Ok(Value::from("beep")));
    host.override_method("Robodog", "Count_Legs", |_, _| Ok(Value::Int(6)));
    // Walk has no callback, so a host override is ignored
    host.override_method("Robodog", "Walk", |_, _| Ok(Value::from("rolling")));

    let robodog = runtime.singleton("Robodog", None).unwrap();
    let speak = animal.find_method("Speak").unwrap().offset();
    let walk = animal.find_method("Walk").unwrap().offset();
    let legs = dog.find_method("Count_Legs").unwrap().offset();

    assert!(!robodog.vtable().same_slot(dog.vtable(), speak));
    assert!(!robodog.vtable().same_slot(dog.vtable(), legs));
    assert!(robodog.vtable().same_slot(dog.vtable(), walk));

    let obj = runtime.make_obj(&robodog);
    assert_eq!(obj.invoke(&runtime, speak, &[]).unwrap(), Value::from("beep"));
    assert_eq!(obj.invoke(&runtime, legs, &[]).unwrap(), Value::Int(6));
    assert_eq!(obj.invoke(&runtime, walk, &[]).unwrap(), Value::from("walking"));

    // The parent is never patched
    let plain = runtime.make_obj(&dog);
    assert_eq!(plain.invoke(&runtime, speak, &[]).unwrap(), Value::from("..."));
}

#[test]
fn test_host_alias_drives_override_matching() {
    let (host, runtime, animal, _dog) = setup(RuntimeOptions::default());
    animal.add_host_method_alias("speak", "Speak");
    host.declare_class("Parrot", "Animal");
    host.override_method("Parrot", "speak", |_, _| Ok(Value::from("polly")));

    let parrot = runtime.singleton("Parrot", None).unwrap();
    let speak = animal.find_method("Speak").unwrap().offset();
    let obj = runtime.make_obj(&parrot);
    assert_eq!(obj.invoke(&runtime, speak, &[]).unwrap(), Value::from("polly"));
}

#[test]
fn test_lowercase_host_names() {
    let host = Arc::new(SandboxHost::new().with_lowercase_names());
    let runtime = Runtime::new(host.clone());
    let (animal, offset) = (ClassSlot::new(), OffsetSlot::new());
    runtime.bootstrap(&[ClassDescriptor::new("Animal", &animal)
        .with_ivars_size(OBJ_HEADER_SIZE)
        .novel_method_with_callback("Speak", speak, speak_via_host, &offset)]);
    host.declare_class("Cat", "Animal");
    host.override_method("Cat", "speak", |_, _| Ok(Value::from("meow")));

    let cat = runtime.singleton("Cat", None).unwrap();
    let speak = offset.get().unwrap();
    assert!(!cat.vtable().same_slot(animal.get().unwrap().vtable(), speak));
}

#[test]
fn test_subclass_of_subclass_inherits_overrides() {
    let (host, runtime, animal, _dog) = setup(RuntimeOptions::default());
    host.declare_class("Wolf", "Animal");
    host.override_method("Wolf", "Speak", |_, _| Ok(Value::from("howl")));
    host.declare_class("Werewolf", "Wolf");

    let werewolf = runtime.singleton("Werewolf", None).unwrap();
    let wolf = runtime.class("Wolf").unwrap();
    let speak = animal.find_method("Speak").unwrap().offset();
    assert!(werewolf.vtable().same_slot(wolf.vtable(), speak));

    let obj = runtime.make_obj(&werewolf);
    assert_eq!(obj.invoke(&runtime, speak, &[]).unwrap(), Value::from("howl"));
    assert_eq!(
        host.registrations(),
        vec![
            ("Wolf".to_string(), "Animal".to_string()),
            ("Werewolf".to_string(), "Wolf".to_string()),
        ]
    );
}

#[test]
fn test_undeclared_class_has_no_ancestor() {
    let (_host, runtime, _animal, _dog) = setup(RuntimeOptions::default());
    let err = runtime.singleton("Unicorn", None).unwrap_err();
    assert_eq!(err.to_string(), "Class 'Unicorn' doesn't descend from Obj");
}

#[test]
fn test_unknown_host_parent_has_no_ancestor() {
    let (host, runtime, _animal, _dog) = setup(RuntimeOptions::default());
    host.declare_class("Chimera", "Mythical");
    assert_eq!(
        runtime.singleton("Chimera", None).unwrap_err(),
        RuntimeError::NoAncestor {
            class: "Mythical".to_string(),
            root: "Obj".to_string(),
        }
    );
}

#[test]
fn test_subclass_describe() {
    let (host, runtime, _animal, _dog) = setup(RuntimeOptions::default());
    host.declare_class("Martian", "Dog");
    runtime.singleton("Martian", None).unwrap();

    let info = runtime.describe("Martian").unwrap();
    assert_eq!(info.parent.as_deref(), Some("Dog"));
    assert!(info.methods.is_empty());
    assert_eq!(info.vtable_slots, 3);
}
