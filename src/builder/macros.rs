//! Macros for declaring state and event discriminators.

/// Generate a state enum and its `State` implementation.
///
/// # Example
///
/// ```
/// use hsm_actors::state_enum;
/// use hsm_actors::core::State;
///
/// state_enum! {
///     pub enum Light {
///         Root,
///         Red,
///         Green,
///     }
/// }
///
/// assert_eq!(Light::Green.name(), "Green");
/// ```
#[macro_export]
macro_rules! state_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $(
                $(#[$variant_meta:meta])*
                $variant:ident
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(
            Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug,
            serde::Serialize, serde::Deserialize
        )]
        $vis enum $name {
            $(
                $(#[$variant_meta])*
                $variant
            ),*
        }

        impl $crate::core::State for $name {
            fn name(&self) -> &'static str {
                match self {
                    $(Self::$variant => stringify!($variant)),*
                }
            }
        }
    };
}

/// Generate an event kind enum and its `EventKind` implementation.
///
/// # Example
///
/// ```
/// use hsm_actors::event_enum;
/// use hsm_actors::core::EventKind;
///
/// event_enum! {
///     pub enum Traffic {
///         Timer,
///         Emergency,
///     }
/// }
///
/// assert_eq!(Traffic::Emergency.name(), "Emergency");
/// ```
#[macro_export]
macro_rules! event_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $(
                $(#[$variant_meta:meta])*
                $variant:ident
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(
            Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug,
            serde::Serialize, serde::Deserialize
        )]
        $vis enum $name {
            $(
                $(#[$variant_meta])*
                $variant
            ),*
        }

        impl $crate::core::EventKind for $name {
            fn name(&self) -> &'static str {
                match self {
                    $(Self::$variant => stringify!($variant)),*
                }
            }
        }
    };
}
