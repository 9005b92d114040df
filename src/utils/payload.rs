use std::{fmt::Display, str::FromStr};

use lazy_static::lazy_static;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use regex::Regex;

use crate::entries::prelude::*;

lazy_static! {
    pub static ref PAYLOAD_RE: Regex = Regex::new(concat!(
        r"^(?<op>\d+)",
        r"(\sp(?<page>\d+))?",
        r"(\so(?<order_id>[^\s]+))?",
        r"(\si(?<index>\d+))?$"
    ))
    .unwrap();
}

macro_rules! write_arg {
    ($args:expr, $prefix:expr, $item:expr) => {
        if let Some(some) = $item.as_ref() {
            $args.push(format!("{}{}", $prefix, some));
        };
    };
}

/// Compact callback data of the operator menu, e.g. `4 p2` or `5 o12345`.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct Payload {
    pub op: PayloadOp,
    pub page: Option<usize>,
    pub order_id: Option<OrderId>,
    /// Denylist position or toggle number, depending on `op`.
    pub index: Option<usize>,
}

impl Payload {
    pub fn op(op: PayloadOp) -> Self {
        Self {
            op,
            ..Default::default()
        }
    }

    pub fn toggle(toggle: Toggle) -> Self {
        Self {
            op: PayloadOp::Toggle,
            index: Some(toggle as usize),
            ..Default::default()
        }
    }

    pub fn history(page: usize) -> Self {
        Self {
            op: PayloadOp::History,
            page: Some(page),
            ..Default::default()
        }
    }

    pub fn order_details(order_id: &str, page: usize) -> Self {
        Self {
            op: PayloadOp::OrderDetails,
            page: Some(page),
            order_id: Some(order_id.to_owned()),
            ..Default::default()
        }
    }

    pub fn denylist_remove(index: usize) -> Self {
        Self {
            op: PayloadOp::DenylistRemove,
            index: Some(index),
            ..Default::default()
        }
    }

    pub fn toggle_kind(&self) -> Option<Toggle> {
        self.index.and_then(Toggle::from_usize)
    }
}

impl ToString for Payload {
    fn to_string(&self) -> String {
        let mut args = vec![self.op.to_string()];

        write_arg!(args, "p", self.page);
        write_arg!(args, "o", self.order_id);
        write_arg!(args, "i", self.index);

        args.join(" ")
    }
}

impl FromStr for Payload {
    type Err = PayloadError;

    fn from_str(payload: &str) -> Result<Self, Self::Err> {
        let captures = PAYLOAD_RE
            .captures(payload)
            .ok_or_else(|| PayloadError::InvalidPayload(payload.to_owned()))?;

        let op: PayloadOp = captures
            .name("op")
            .and_then(|s| s.as_str().parse::<u8>().ok())
            .and_then(FromPrimitive::from_u8)
            .ok_or_else(|| PayloadError::InvalidOp(payload.to_owned()))?;

        let page = captures
            .name("page")
            .map(|s| s.as_str().parse::<usize>())
            .transpose()
            .map_err(|_| PayloadError::InvalidNumber(payload.to_owned()))?;

        let index = captures
            .name("index")
            .map(|s| s.as_str().parse::<usize>())
            .transpose()
            .map_err(|_| PayloadError::InvalidNumber(payload.to_owned()))?;

        Ok(Payload {
            op,
            page,
            order_id: captures.name("order_id").map(|s| s.as_str().to_owned()),
            index,
        })
    }
}

#[derive(Default, Copy, Clone, Debug, PartialEq, PartialOrd, Eq, Ord, FromPrimitive)]
pub enum PayloadOp {
    #[default]
    None = 0,
    Menu,
    Toggle,
    Stats,
    History,
    OrderDetails,
    Denylist,
    DenylistRemove,
    DenylistAdd,
    Lots,
    LotsOn,
    LotsOff,
    AddLot,
    SetLogin,
    SetPassword,
    Refresh,
}

impl PayloadOp {
    /// Whether `data` carries exactly this op.
    pub fn is_in_payload(&self, data: &str) -> bool {
        data.split_whitespace().next() == Some(self.to_string().as_str())
    }
}

impl ToString for PayloadOp {
    fn to_string(&self) -> String {
        (*self as u8).to_string()
    }
}

/// Boolean settings the operator flips from the menu.
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive)]
pub enum Toggle {
    AutoRefund = 0,
    Notifications,
    Confirmation,
    Reminder,
    Verification,
    LotDeactivation,
    NotifySuccess,
    NotifyError,
    NotifyRefund,
    NotifyBalance,
}

impl Toggle {
    pub const ALL: [Toggle; 10] = [
        Toggle::AutoRefund,
        Toggle::Notifications,
        Toggle::Confirmation,
        Toggle::Reminder,
        Toggle::Verification,
        Toggle::LotDeactivation,
        Toggle::NotifySuccess,
        Toggle::NotifyError,
        Toggle::NotifyRefund,
        Toggle::NotifyBalance,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Toggle::AutoRefund => "Auto-refund",
            Toggle::Notifications => "Notifications",
            Toggle::Confirmation => "Confirmation",
            Toggle::Reminder => "Reminder",
            Toggle::Verification => "Order check",
            Toggle::LotDeactivation => "Lots off on 0$",
            Toggle::NotifySuccess => "Sales",
            Toggle::NotifyError => "Errors",
            Toggle::NotifyRefund => "Refunds",
            Toggle::NotifyBalance => "Balance",
        }
    }

    fn field<'a>(&self, settings: &'a mut Settings) -> &'a mut bool {
        match self {
            Toggle::AutoRefund => &mut settings.auto_refund_on_error,
            Toggle::Notifications => &mut settings.notifications_enabled,
            Toggle::Confirmation => &mut settings.confirmation_required,
            Toggle::Reminder => &mut settings.confirmation_reminder,
            Toggle::Verification => &mut settings.order_verification_enabled,
            Toggle::LotDeactivation => &mut settings.deactivate_lots_on_insufficient_funds,
            Toggle::NotifySuccess => &mut settings.notification_types.success,
            Toggle::NotifyError => &mut settings.notification_types.error,
            Toggle::NotifyRefund => &mut settings.notification_types.refund,
            Toggle::NotifyBalance => &mut settings.notification_types.balance,
        }
    }

    pub fn get(&self, settings: &Settings) -> bool {
        match self {
            Toggle::AutoRefund => settings.auto_refund_on_error,
            Toggle::Notifications => settings.notifications_enabled,
            Toggle::Confirmation => settings.confirmation_required,
            Toggle::Reminder => settings.confirmation_reminder,
            Toggle::Verification => settings.order_verification_enabled,
            Toggle::LotDeactivation => settings.deactivate_lots_on_insufficient_funds,
            Toggle::NotifySuccess => settings.notification_types.success,
            Toggle::NotifyError => settings.notification_types.error,
            Toggle::NotifyRefund => settings.notification_types.refund,
            Toggle::NotifyBalance => settings.notification_types.balance,
        }
    }

    /// Flips the setting and returns its new value.
    pub fn apply(&self, settings: &mut Settings) -> bool {
        let field = self.field(settings);
        *field = !*field;
        *field
    }
}

#[derive(Debug)]
pub enum PayloadError {
    InvalidPayload(String),
    InvalidOp(String),
    InvalidNumber(String),
}

impl Display for PayloadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PayloadError::InvalidPayload(payload) => {
                write!(f, "Invalid payload: {}", payload)
            }
            PayloadError::InvalidOp(payload) => {
                write!(f, "Invalid op in payload: {}", payload)
            }
            PayloadError::InvalidNumber(payload) => {
                write!(f, "Invalid number in payload: {}", payload)
            }
        }
    }
}

impl std::error::Error for PayloadError {}
