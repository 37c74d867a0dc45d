use bevy::prelude::*;

use crate::{controller::DeviceId, pointer::PointerSnapshot};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PointerEventKind {
    Enter,
    Exit,
    Down,
    Up,
    Click,
    InitializePotentialDrag,
    BeginDrag,
    Drag,
    EndDrag,
    Drop,
}

/// A notification for `target`, written by the router in emission order.
#[derive(Event, Clone, Copy, Debug, PartialEq)]
pub struct PointerEvent {
    pub pointer: DeviceId,
    pub target: Entity,
    pub kind: PointerEventKind,
    pub data: PointerSnapshot,
}

/// The hovered target of a pointer changed.
#[derive(Event, Clone, Copy, Debug, PartialEq, Eq)]
pub struct HoverChanged {
    pub pointer: DeviceId,
    pub previous: Option<Entity>,
    pub current: Option<Entity>,
}
