//! The protocol: every handler, reduce operator, and collection type a
//! program uses, registered before the runtime starts.
//!
//! Registration assigns dense ids in call order. Since every node runs the
//! same registration code, ids agree across the world without
//! communication. The built-in system handlers occupy the first slots.

use std::any::TypeId;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::rc::Rc;

use weft_serde::Serde;

use crate::collection::{Collection, ElementHandler};
use crate::handler::{ActiveHandler, HandlerId, HandlerKind, HandlerKinds};
use crate::objgroup::{ObjGroup, ObjGroupHandler};
use crate::reduce::{ReduceKinds, ReduceOp};
use crate::runtime::system;
use crate::runtime::{collection_ops, Runtime};

/// Registry keys for the per-collection system dispatchers.
struct MigrateOf<C>(PhantomData<C>);
struct InsertOf<C>(PhantomData<C>);

pub(crate) struct CollectionIds {
    pub migrate: HandlerId,
    pub insert: HandlerId,
}

/// Everything registered for a program, locked when the runtime starts.
pub struct Protocol {
    pub(crate) handlers: HandlerKinds,
    pub(crate) reduce_ops: ReduceKinds,
    pub(crate) collections: HashMap<TypeId, CollectionIds>,
    locked: bool,
}

fn short_type_name<T: ?Sized>() -> String {
    let full = std::any::type_name::<T>();
    full.rsplit("::").next().unwrap_or(full).to_string()
}

fn dispatch_active<H: ActiveHandler>(
    rt: &mut Runtime,
    reader: &mut crate::BitReader,
) -> Result<(), crate::SerdeErr> {
    let msg = H::Msg::de(reader)?;
    H::handle(rt, msg);
    Ok(())
}

fn dispatch_obj<O: ObjGroup, H: ObjGroupHandler<O>>(
    rt: &mut Runtime,
    reader: &mut crate::BitReader,
) -> Result<(), crate::SerdeErr> {
    let msg = H::Msg::de(reader)?;
    let idx = rt.current_handler().obj();
    let mut obj = rt.take_obj(idx);
    let Some(typed) = obj.downcast_mut::<O>() else {
        rt.fatal("object group index resolves to a different type");
    };
    H::handle(typed, rt, msg);
    rt.put_obj(idx, obj);
    Ok(())
}

impl Default for Protocol {
    fn default() -> Self {
        let mut protocol = Self {
            handlers: HandlerKinds::new(),
            reduce_ops: ReduceKinds::new(),
            collections: HashMap::new(),
            locked: false,
        };
        system::register_system_handlers(&mut protocol);
        protocol
    }
}

impl Protocol {
    pub fn builder() -> Self {
        Self::default()
    }

    fn check_lock(&self) {
        if self.locked {
            panic!("protocol is locked; register everything before starting the runtime");
        }
    }

    pub(crate) fn lock(mut self) -> Self {
        self.locked = true;
        self
    }

    /// Register an active-message handler.
    pub fn add_handler<H: ActiveHandler>(&mut self) -> &mut Self {
        self.check_lock();
        self.handlers
            .register(
                TypeId::of::<H>(),
                HandlerKind::Auto,
                0,
                short_type_name::<H>(),
                Rc::new(dispatch_active::<H>),
            )
            .unwrap_or_else(|e| panic!("registering handler: {}", e));
        self
    }

    /// Register an object-group member handler. The object index is
    /// stamped into the handler id at send time.
    pub fn add_obj_handler<O: ObjGroup, H: ObjGroupHandler<O>>(&mut self) -> &mut Self {
        self.check_lock();
        self.handlers
            .register(
                TypeId::of::<(O, H)>(),
                HandlerKind::ObjGroup,
                0,
                short_type_name::<H>(),
                Rc::new(dispatch_obj::<O, H>),
            )
            .unwrap_or_else(|e| panic!("registering object-group handler: {}", e));
        self
    }

    /// Register a collection element type: installs its migration and
    /// insertion dispatchers.
    pub fn add_collection<C: Collection>(&mut self) -> &mut Self {
        self.check_lock();
        let migrate = self
            .handlers
            .register(
                TypeId::of::<MigrateOf<C>>(),
                HandlerKind::Collection,
                0,
                format!("{}::migrate", short_type_name::<C>()),
                Rc::new(collection_ops::dispatch_migrate::<C>),
            )
            .unwrap_or_else(|e| panic!("registering collection: {}", e));
        let insert = self
            .handlers
            .register(
                TypeId::of::<InsertOf<C>>(),
                HandlerKind::Collection,
                0,
                format!("{}::insert", short_type_name::<C>()),
                Rc::new(collection_ops::dispatch_insert::<C>),
            )
            .unwrap_or_else(|e| panic!("registering collection: {}", e));
        self.collections
            .insert(TypeId::of::<C>(), CollectionIds { migrate, insert });
        self
    }

    /// Register a handler addressed to elements of collection `C`.
    pub fn add_element_handler<C: Collection, H: ElementHandler<C>>(&mut self) -> &mut Self {
        self.check_lock();
        self.handlers
            .register(
                TypeId::of::<(C, H)>(),
                HandlerKind::Collection,
                0,
                short_type_name::<H>(),
                Rc::new(collection_ops::dispatch_element::<C, H>),
            )
            .unwrap_or_else(|e| panic!("registering element handler: {}", e));
        self
    }

    /// Register a reduction operator.
    pub fn add_reduce_op<O: ReduceOp>(&mut self) -> &mut Self {
        self.check_lock();
        self.reduce_ops.register::<O>();
        self
    }

    /// Set the human-readable trace name attached to a handler's log
    /// lines and diagnostics.
    pub fn set_handler_trace_name<H: ActiveHandler>(&mut self, name: &str) -> &mut Self {
        self.check_lock();
        if let Some(id) = self.handlers.id_of(&TypeId::of::<H>()) {
            self.handlers.set_trace_name(id, name.to_string());
        }
        self
    }

    // Lookup

    /// The id minted for a registered handler type.
    pub fn handler_id<H: ActiveHandler>(&self) -> Option<HandlerId> {
        self.handlers.id_of(&TypeId::of::<H>())
    }

    /// The trace name attached to a handler id.
    pub fn trace_name(&self, handler: HandlerId) -> &str {
        self.handlers.trace_name(handler)
    }

    pub(crate) fn id_of_handler<H: ActiveHandler>(&self) -> Option<HandlerId> {
        self.handlers.id_of(&TypeId::of::<H>())
    }

    pub(crate) fn id_of_element_handler<C: Collection, H: ElementHandler<C>>(
        &self,
    ) -> Option<HandlerId> {
        self.handlers.id_of(&TypeId::of::<(C, H)>())
    }

    pub(crate) fn id_of_obj_handler<O: ObjGroup, H: ObjGroupHandler<O>>(
        &self,
    ) -> Option<HandlerId> {
        self.handlers.id_of(&TypeId::of::<(O, H)>())
    }

    pub(crate) fn collection_ids<C: Collection>(&self) -> Option<&CollectionIds> {
        self.collections.get(&TypeId::of::<C>())
    }
}
