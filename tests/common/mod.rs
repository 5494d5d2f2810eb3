//! Test harness: an in-process library that registers `Foo` and `FooChild`
//! through the interface function table, and a host wrapper around it.
//!
//! The library reads a [`LibraryConfig`] every time its entry runs, so a test
//! changes what the next generation registers and then reloads.

#![allow(dead_code)]

use std::ffi::c_void;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use dynext::interface::{
    RegisterClassFn, RegisterClassesUsedCallbackFn, RegisterIntegerConstantFn,
    RegisterMainLoopCallbacksFn, RegisterMethodFn, RegisterPropertyFn, RegisterPropertyGroupFn,
    RegisterSignalFn, UnregisterClassFn,
};
use dynext::prelude::*;
use dynext::ptrcall::{self, RawObject};
use dynext::{MethodDefinition, MethodUserdata};
use parking_lot::Mutex;

pub const FOO: &str = "Foo";
pub const FOO_CHILD: &str = "FooChild";
pub const LIBRARY_PATH: &str = "res://bin/libfoo.so";

// ============================================================================
// Library Configuration
// ============================================================================

/// What the next generation of the library registers.
#[derive(Debug, Clone)]
pub struct LibraryConfig {
    pub minimum_level: InitializationLevel,
    pub reloadable: bool,
    pub register_foo: bool,
    pub register_child: bool,
    /// Multiplier applied by `Foo.bar`.
    pub bar_factor: i64,
    /// Register `bar(x: float) -> float` instead of `bar(x: int) -> int`.
    pub float_bar: bool,
    pub with_recreate: bool,
    pub main_loop: bool,
    /// Parent `FooChild` is registered under.
    pub child_parent: &'static str,
    /// Instantiate a `Foo` while initializing the scene level.
    pub spawn_in_init: bool,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            minimum_level: InitializationLevel::Scene,
            reloadable: true,
            register_foo: true,
            register_child: true,
            bar_factor: 2,
            float_bar: false,
            with_recreate: true,
            main_loop: false,
            child_parent: FOO,
            spawn_in_init: false,
        }
    }
}

/// Counters shared with every instance callback through the class userdata.
#[derive(Debug, Default)]
pub struct ClassStats {
    pub created: AtomicUsize,
    pub recreated: AtomicUsize,
    pub freed: AtomicUsize,
}

impl ClassStats {
    pub fn freed(&self) -> usize {
        self.freed.load(Ordering::SeqCst)
    }

    pub fn recreated(&self) -> usize {
        self.recreated.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Default)]
pub struct LibraryState {
    pub config: LibraryConfig,
    pub entries: usize,
    pub initialized: Vec<InitializationLevel>,
    pub deinitialized: Vec<InitializationLevel>,
    /// Classes registered by the current generation, in order.
    pub registered: Vec<StringName>,
    /// Objects the library created itself, oldest first.
    pub spawned: Vec<InstanceId>,
    pub stats: Arc<ClassStats>,
}

pub type SharedState = Arc<Mutex<LibraryState>>;

pub fn shared_state(config: LibraryConfig) -> SharedState {
    Arc::new(Mutex::new(LibraryState {
        config,
        ..LibraryState::default()
    }))
}

// ============================================================================
// Instances
// ============================================================================

#[derive(Debug)]
pub struct FooInstance {
    pub id: InstanceId,
    pub value: i64,
    pub notifications: Vec<i32>,
    pub recreated: bool,
}

impl FooInstance {
    fn new(id: InstanceId, recreated: bool) -> Self {
        Self {
            id,
            value: 0,
            notifications: Vec::new(),
            recreated,
        }
    }
}

fn stats(userdata: Option<&ClassUserdata>) -> Option<&ClassStats> {
    userdata?.downcast_ref::<ClassStats>()
}

fn create_foo(userdata: Option<&ClassUserdata>, id: InstanceId, _notify: bool) -> InstanceData {
    if let Some(stats) = stats(userdata) {
        stats.created.fetch_add(1, Ordering::SeqCst);
    }
    Box::new(FooInstance::new(id, false))
}

fn recreate_foo(userdata: Option<&ClassUserdata>, id: InstanceId) -> InstanceData {
    if let Some(stats) = stats(userdata) {
        stats.recreated.fetch_add(1, Ordering::SeqCst);
    }
    Box::new(FooInstance::new(id, true))
}

fn free_foo(userdata: Option<&ClassUserdata>, instance: InstanceData) {
    if let Some(stats) = stats(userdata) {
        stats.freed.fetch_add(1, Ordering::SeqCst);
    }
    drop(instance);
}

fn notify_foo(instance: &mut InstanceData, what: i32, _reversed: bool) {
    if let Some(foo) = instance.downcast_mut::<FooInstance>() {
        foo.notifications.push(what);
    }
}

fn foo_to_string(instance: &InstanceData) -> Option<String> {
    let foo = instance.downcast_ref::<FooInstance>()?;
    Some(format!("Foo(value={})", foo.value))
}

// ============================================================================
// Methods
// ============================================================================

fn factor(userdata: &MethodUserdata) -> i64 {
    userdata.downcast_ref::<i64>().copied().unwrap_or(1)
}

fn bar_call(
    userdata: &MethodUserdata,
    _: Option<&mut InstanceData>,
    args: &[&Variant],
    ret: &mut Variant,
    error: &mut CallError,
) {
    match args.first().and_then(|arg| arg.as_int()) {
        Some(x) => *ret = Variant::Int(x * factor(userdata)),
        None => *error = CallError::invalid_argument(0, VariantType::Int),
    }
}

fn bar_validated(userdata: &MethodUserdata, _: Option<&mut InstanceData>, args: &[&Variant], ret: &mut Variant) {
    let x = args[0].as_int().unwrap_or_default();
    *ret = Variant::Int(x * factor(userdata));
}

unsafe fn bar_ptrcall(userdata: &MethodUserdata, _: Option<&mut InstanceData>, args: &[*const c_void], ret: *mut c_void) {
    unsafe {
        let x = *ptrcall::arg::<i64>(args, 0);
        ptrcall::write_return(ret, x * factor(userdata));
    }
}

fn float_bar_call(
    userdata: &MethodUserdata,
    _: Option<&mut InstanceData>,
    args: &[&Variant],
    ret: &mut Variant,
    _: &mut CallError,
) {
    let x = args[0].as_float().unwrap_or_default();
    *ret = Variant::Float(x * factor(userdata) as f64);
}

fn scale_call(_: &MethodUserdata, _: Option<&mut InstanceData>, args: &[&Variant], ret: &mut Variant, _: &mut CallError) {
    *ret = Variant::Float(args[0].as_float().unwrap_or_default() * 1.5);
}

unsafe fn scale_ptrcall(_: &MethodUserdata, _: Option<&mut InstanceData>, args: &[*const c_void], ret: *mut c_void) {
    unsafe {
        let x = *ptrcall::arg::<f64>(args, 0);
        ptrcall::write_return(ret, x * 1.5);
    }
}

fn echo_call(_: &MethodUserdata, _: Option<&mut InstanceData>, args: &[&Variant], ret: &mut Variant, _: &mut CallError) {
    *ret = args[0].clone();
}

unsafe fn echo_ptrcall(_: &MethodUserdata, _: Option<&mut InstanceData>, args: &[*const c_void], ret: *mut c_void) {
    unsafe {
        let object = *ptrcall::arg::<RawObject>(args, 0);
        ptrcall::write_return(ret, object);
    }
}

fn set_value_call(
    _: &MethodUserdata,
    instance: Option<&mut InstanceData>,
    args: &[&Variant],
    _: &mut Variant,
    error: &mut CallError,
) {
    let foo = instance.and_then(|instance| instance.downcast_mut::<FooInstance>());
    match (foo, args.first().and_then(|arg| arg.as_int())) {
        (Some(foo), Some(value)) => foo.value = value,
        (None, _) => *error = CallError::instance_is_null(),
        (_, None) => *error = CallError::invalid_argument(0, VariantType::Int),
    }
}

fn get_value_call(
    _: &MethodUserdata,
    instance: Option<&mut InstanceData>,
    _: &[&Variant],
    ret: &mut Variant,
    error: &mut CallError,
) {
    match instance.and_then(|instance| instance.downcast_mut::<FooInstance>()) {
        Some(foo) => *ret = Variant::Int(foo.value),
        None => *error = CallError::instance_is_null(),
    }
}

fn add_call(_: &MethodUserdata, _: Option<&mut InstanceData>, args: &[&Variant], ret: &mut Variant, _: &mut CallError) {
    *ret = Variant::Int(args.iter().filter_map(|arg| arg.as_int()).sum());
}

fn ping_call(_: &MethodUserdata, _: Option<&mut InstanceData>, _: &[&Variant], ret: &mut Variant, _: &mut CallError) {
    *ret = Variant::from("pong");
}

fn method(name: &str, call: dynext::MethodCallFn) -> MethodDefinition {
    MethodDefinition::new(name, Arc::new(()), call)
}

fn bar_definition(config: &LibraryConfig) -> MethodDefinition {
    let userdata: MethodUserdata = Arc::new(config.bar_factor);
    if config.float_bar {
        return MethodDefinition::new("bar", userdata, float_bar_call)
            .with_argument(PropertyInfo::new("x", VariantType::Float))
            .with_return(PropertyInfo::new("", VariantType::Float));
    }
    MethodDefinition::new("bar", userdata, bar_call)
        .with_validated_call(bar_validated)
        .with_ptrcall(bar_ptrcall)
        .with_argument(PropertyInfo::new("x", VariantType::Int))
        .with_return(PropertyInfo::new("", VariantType::Int))
}

// ============================================================================
// Main Loop Hooks
// ============================================================================

pub static STARTUPS: AtomicUsize = AtomicUsize::new(0);
pub static FRAMES: AtomicUsize = AtomicUsize::new(0);
pub static SHUTDOWNS: AtomicUsize = AtomicUsize::new(0);

fn on_startup() {
    STARTUPS.fetch_add(1, Ordering::SeqCst);
}

fn on_frame() {
    FRAMES.fetch_add(1, Ordering::SeqCst);
}

fn on_shutdown() {
    SHUTDOWNS.fetch_add(1, Ordering::SeqCst);
}

fn classes_used(classes: &mut Vec<StringName>) {
    classes.push(StringName::new(FOO));
    classes.push(StringName::new("NeverRegistered"));
}

// ============================================================================
// Registration
// ============================================================================

macro_rules! resolve {
    ($runtime:expr, $name:expr, $variant:ident) => {
        match $runtime.interface().resolve($name) {
            Ok(InterfaceFunction::$variant(function)) => function,
            other => panic!("interface function {} resolved to {other:?}", $name),
        }
    };
}

fn state_of(userdata: Option<&ExtensionUserdata>) -> Option<&Mutex<LibraryState>> {
    userdata?.downcast_ref::<Mutex<LibraryState>>()
}

fn foo_info(config: &LibraryConfig, stats: &Arc<ClassStats>) -> ClassCreationInfo5 {
    let userdata: ClassUserdata = Arc::clone(stats) as ClassUserdata;
    ClassCreationInfo5 {
        icon_path: "res://icons/foo.svg".to_owned(),
        notification_func: Some(notify_foo),
        to_string_func: Some(foo_to_string),
        create_instance_func: Some(create_foo),
        free_instance_func: Some(free_foo),
        recreate_instance_func: config.with_recreate.then_some(recreate_foo as dynext::RecreateInstanceFn),
        class_userdata: Some(userdata),
        ..ClassCreationInfo5::default()
    }
}

fn register_foo(runtime: &mut Runtime, library: ExtensionToken, config: &LibraryConfig, stats: &Arc<ClassStats>) {
    let register_class: RegisterClassFn<ClassCreationInfo5> =
        resolve!(runtime, names::REGISTER_CLASS5, RegisterClass5);
    let register_method: RegisterMethodFn = resolve!(runtime, names::REGISTER_METHOD, RegisterMethod);
    let register_property: RegisterPropertyFn = resolve!(runtime, names::REGISTER_PROPERTY, RegisterProperty);
    let register_group: RegisterPropertyGroupFn =
        resolve!(runtime, names::REGISTER_PROPERTY_GROUP, RegisterPropertyGroup);
    let register_constant: RegisterIntegerConstantFn =
        resolve!(runtime, names::REGISTER_INTEGER_CONSTANT, RegisterIntegerConstant);
    let register_signal: RegisterSignalFn = resolve!(runtime, names::REGISTER_SIGNAL, RegisterSignal);

    let foo = StringName::new(FOO);
    let none = StringName::empty();
    register_class(runtime, library, &foo, &StringName::new("RefCounted"), foo_info(config, stats))
        .expect("register Foo");

    let methods = [
        bar_definition(config),
        method("set_value", set_value_call).with_argument(PropertyInfo::new("value", VariantType::Int)),
        method("get_value", get_value_call)
            .with_flags(MethodFlags::NORMAL | MethodFlags::CONST)
            .with_return(PropertyInfo::new("", VariantType::Int)),
        method("scale", scale_call)
            .with_ptrcall(scale_ptrcall)
            .with_argument(PropertyInfo::new("x", VariantType::Float))
            .with_return(PropertyInfo::new("", VariantType::Float)),
        method("echo", echo_call)
            .with_ptrcall(echo_ptrcall)
            .with_argument(PropertyInfo::new("object", VariantType::Object))
            .with_return(PropertyInfo::new("", VariantType::Object)),
        method("add", add_call)
            .with_flags(MethodFlags::NORMAL | MethodFlags::STATIC)
            .with_argument(PropertyInfo::new("a", VariantType::Int))
            .with_argument(PropertyInfo::new("b", VariantType::Int))
            .with_default_argument(Variant::Int(10))
            .with_return(PropertyInfo::new("", VariantType::Int)),
    ];
    for definition in methods {
        register_method(runtime, library, &foo, definition).expect("register Foo method");
    }

    register_property(
        runtime,
        library,
        &foo,
        PropertyInfo::new("value", VariantType::Int),
        &StringName::new("set_value"),
        &StringName::new("get_value"),
    )
    .expect("register value");
    register_group(runtime, library, &foo, "Links", "").expect("register group");
    register_property(runtime, library, &foo, PropertyInfo::new("label", VariantType::String), &none, &none)
        .expect("register label");
    register_property(
        runtime,
        library,
        &foo,
        PropertyInfo::new("target", VariantType::Object).with_class_name("Node"),
        &none,
        &none,
    )
    .expect("register target");
    register_property(
        runtime,
        library,
        &foo,
        PropertyInfo::new("anchor", VariantType::Object)
            .with_usage(PropertyUsage::DEFAULT | PropertyUsage::STORE_IF_NULL),
        &none,
        &none,
    )
    .expect("register anchor");

    register_constant(runtime, library, &foo, &StringName::new("Mode"), &StringName::new("MODE_FAST"), 1, false)
        .expect("register constant");
    register_signal(
        runtime,
        library,
        &foo,
        &StringName::new("value_changed"),
        vec![PropertyInfo::new("value", VariantType::Int)],
    )
    .expect("register signal");
}

fn register_child(runtime: &mut Runtime, library: ExtensionToken, config: &LibraryConfig, stats: &Arc<ClassStats>) {
    let register_class: RegisterClassFn<ClassCreationInfo5> =
        resolve!(runtime, names::REGISTER_CLASS5, RegisterClass5);
    let register_method: RegisterMethodFn = resolve!(runtime, names::REGISTER_METHOD, RegisterMethod);
    let register_property: RegisterPropertyFn = resolve!(runtime, names::REGISTER_PROPERTY, RegisterProperty);

    let child = StringName::new(FOO_CHILD);
    register_class(runtime, library, &child, &StringName::new(config.child_parent), foo_info(config, stats))
        .expect("register FooChild");
    register_method(runtime, library, &child, method("ping", ping_call).with_return(PropertyInfo::new("", VariantType::String)))
        .expect("register ping");
    if config.child_parent == FOO {
        return;
    }

    // Outside Foo the child carries its own copy of `value`.
    let accessors = [
        method("set_value", set_value_call).with_argument(PropertyInfo::new("value", VariantType::Int)),
        method("get_value", get_value_call)
            .with_flags(MethodFlags::NORMAL | MethodFlags::CONST)
            .with_return(PropertyInfo::new("", VariantType::Int)),
    ];
    for definition in accessors {
        register_method(runtime, library, &child, definition).expect("register FooChild accessor");
    }
    register_property(
        runtime,
        library,
        &child,
        PropertyInfo::new("value", VariantType::Int),
        &StringName::new("set_value"),
        &StringName::new("get_value"),
    )
    .expect("register FooChild value");
}

fn initialize(runtime: &mut Runtime, library: ExtensionToken, userdata: Option<&ExtensionUserdata>, level: InitializationLevel) {
    let Some(state) = state_of(userdata) else {
        return;
    };
    let (config, stats) = {
        let mut state = state.lock();
        state.initialized.push(level);
        (state.config.clone(), Arc::clone(&state.stats))
    };
    if level != InitializationLevel::Scene {
        return;
    }

    let mut registered = Vec::new();
    if config.register_foo {
        register_foo(runtime, library, &config, &stats);
        registered.push(StringName::new(FOO));
        if config.register_child {
            register_child(runtime, library, &config, &stats);
            registered.push(StringName::new(FOO_CHILD));
        }
        if config.spawn_in_init {
            let id = runtime.instantiate(&StringName::new(FOO)).expect("spawn Foo");
            state.lock().spawned.push(id);
        }
    }

    let register_used: RegisterClassesUsedCallbackFn =
        resolve!(runtime, names::REGISTER_CLASSES_USED_CALLBACK, RegisterClassesUsedCallback);
    register_used(runtime, library, classes_used).expect("register classes used");
    if config.main_loop {
        let register_main_loop: RegisterMainLoopCallbacksFn =
            resolve!(runtime, names::REGISTER_MAIN_LOOP_CALLBACKS, RegisterMainLoopCallbacks);
        let callbacks = MainLoopCallbacks {
            startup: Some(on_startup),
            shutdown: Some(on_shutdown),
            frame: Some(on_frame),
        };
        register_main_loop(runtime, library, callbacks).expect("register main loop");
    }
    state.lock().registered = registered;
}

fn deinitialize(runtime: &mut Runtime, library: ExtensionToken, userdata: Option<&ExtensionUserdata>, level: InitializationLevel) {
    let Some(state) = state_of(userdata) else {
        return;
    };
    let registered = {
        let mut state = state.lock();
        state.deinitialized.push(level);
        if level != InitializationLevel::Scene {
            return;
        }
        std::mem::take(&mut state.registered)
    };
    let unregister: UnregisterClassFn = resolve!(runtime, names::UNREGISTER_CLASS, UnregisterClass);
    for class in registered.iter().rev() {
        let _ = unregister(runtime, library, class);
    }
}

/// Loader running the test library's entry against `state`.
pub fn embedded_loader(state: &SharedState) -> EmbeddedLoader {
    let state = Arc::clone(state);
    EmbeddedLoader::new(move |interface, _library, init| {
        if !interface.contains(names::REGISTER_CLASS5) {
            return false;
        }
        {
            let mut guard = state.lock();
            guard.entries += 1;
            init.minimum_level = guard.config.minimum_level;
            init.reloadable = guard.config.reloadable;
        }
        init.initialize = Some(initialize);
        init.deinitialize = Some(deinitialize);
        let userdata: ExtensionUserdata = Arc::clone(&state) as ExtensionUserdata;
        init.userdata = Some(userdata);
        true
    })
}

// ============================================================================
// Host
// ============================================================================

/// A runtime raised to the scene level with the test library loaded.
pub struct TestHost {
    pub runtime: Runtime,
    pub state: SharedState,
    pub changed: Arc<AtomicBool>,
}

impl TestHost {
    pub fn new() -> Self {
        Self::with_config(LibraryConfig::default())
    }

    pub fn with_config(config: LibraryConfig) -> Self {
        Self::with_runtime(Runtime::new(RuntimeConfig::default()), config)
    }

    pub fn with_runtime(mut runtime: Runtime, config: LibraryConfig) -> Self {
        for level in [
            InitializationLevel::Core,
            InitializationLevel::Servers,
            InitializationLevel::Scene,
        ] {
            runtime.initialize_extensions(level).expect("raise host level");
        }
        let state = shared_state(config);
        let loader = embedded_loader(&state);
        let changed = loader.change_flag();
        let status = runtime
            .load_extension(LIBRARY_PATH, Box::new(loader))
            .expect("load test library");
        assert_eq!(status, LoadStatus::Ok);
        Self {
            runtime,
            state,
            changed,
        }
    }

    pub fn token(&self) -> ExtensionToken {
        self.runtime.get_extension(LIBRARY_PATH).expect("library loaded")
    }

    pub fn configure(&self, change: impl FnOnce(&mut LibraryConfig)) {
        change(&mut self.state.lock().config);
    }

    pub fn stats(&self) -> Arc<ClassStats> {
        Arc::clone(&self.state.lock().stats)
    }

    pub fn reload(&mut self) -> LoadStatus {
        self.runtime.reload_extension(LIBRARY_PATH).expect("reload")
    }

    pub fn instantiate(&mut self, class: &str) -> InstanceId {
        self.runtime.instantiate(&StringName::new(class)).expect("instantiate")
    }

    pub fn foo(&self, id: InstanceId) -> &FooInstance {
        self.runtime
            .object(id)
            .and_then(|object| object.instance_as::<FooInstance>())
            .expect("Foo instance")
    }

    pub fn class_of(&self, id: InstanceId) -> String {
        self.runtime.object_class(id).expect("live object").to_string()
    }

    pub fn get(&mut self, id: InstanceId, property: &str) -> Variant {
        self.runtime
            .object_get(id, &StringName::new(property))
            .expect("readable property")
    }

    pub fn set(&mut self, id: InstanceId, property: &str, value: impl Into<Variant>) {
        assert!(self.runtime.object_set(id, &StringName::new(property), value.into()));
    }

    pub fn call(&mut self, id: InstanceId, method: &str, args: &[Variant]) -> Variant {
        self.runtime
            .call_method(id, &StringName::new(method), args)
            .expect("call")
    }
}
