//! Error and message code tables.
//!
//! Every failure and operator notice is published as a pair of parallel
//! topics: the code as a hex string (`StationErrorCode` /
//! `StationMessageCode`) and its description (`StationErrorDescription` /
//! `StationMessageDescription`).
//!
//! Code ranges:
//!
//! | Range    | Owner                  |
//! |----------|------------------------|
//! | `0x00xx` | Station and services   |
//! | `0x01xx` | Carriage               |
//! | `0x02xx` | Dice-half rack         |
//! | `0x03xx` | Plate racks            |
//! | `0x04xx` | Press                  |
//! | `0x05xx` | Press service          |
//! | `0x1xxx` | Messages               |

use core::fmt;

macro_rules! code_table {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $( $variant:ident = $code:literal => $text:literal, )+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum $name {
            $( $variant, )+
        }

        impl $name {
            /// Every entry of the table, in declaration order.
            pub const ALL: &'static [Self] = &[ $( Self::$variant, )+ ];

            /// Numeric code.
            pub const fn code(self) -> u16 {
                match self {
                    $( Self::$variant => $code, )+
                }
            }

            /// Human-readable description.
            pub const fn description(self) -> &'static str {
                match self {
                    $( Self::$variant => $text, )+
                }
            }

            /// Symbolic name.
            pub const fn name(self) -> &'static str {
                match self {
                    $( Self::$variant => stringify!($variant), )+
                }
            }

            /// Code formatted for the code topics, e.g. `0x0101`.
            pub fn hex(self) -> String {
                format!("0x{:04X}", self.code())
            }

            /// Reverse lookup of a numeric code.
            pub fn from_code(code: u16) -> Option<Self> {
                Self::ALL.iter().copied().find(|c| c.code() == code)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{} ({})", self.name(), self.hex())
            }
        }
    };
}

code_table! {
    /// Error codes published on `StationErrorCode`.
    pub enum ErrorCode {
        NoError = 0x0000 => "No error",
        FatalError = 0x0001 => "Fatal error, station stopped",
        Estop = 0x0002 => "Emergency stop activated",
        NoConnection = 0x0003 => "Connection to the supervisory system lost",
        HomingServiceTimeout = 0x0010 => "Homing service did not finish in time",
        PressingServiceTimeout = 0x0011 => "Pressing service did not finish in time",
        InitServiceTimeout = 0x0012 => "Initialization did not finish in time",
        MaterialServiceTimeout = 0x0013 => "Material service did not finish in time",
        InvalidServiceParameters = 0x0014 => "Service parameters are missing or invalid",
        ServiceNotRegistered = 0x0015 => "No service is registered for the requested slot",
        DeviceFault = 0x0020 => "Device output could not be written",
        CarriageMovingToRackTimeout = 0x0101 => "Carriage did not reach the rack position in time",
        CarriageMovingToDispatchTimeout = 0x0102 => "Carriage did not reach the dispatch position in time",
        RackEmptyDicehalfsNum = 0x0201 => "Dice-half rack is empty",
        RackNegDicehalfsNum = 0x0202 => "Number of dice halves cannot be negative",
        NotEmptyRack = 0x0203 => "Rack is not empty, number of dice halves must be positive",
        RackDicehalfsNumMaximum = 0x0204 => "Number of dice halves exceeds the rack capacity",
        WrongDiceplateColor = 0x0301 => "Requested plate color is not stored in this rack",
        RackDiceplateNumMinimum = 0x0302 => "Not enough plates of the requested color",
        RackDiceplateNumMaximum = 0x0303 => "Number of plates exceeds the rack capacity",
        StorageFileError = 0x0304 => "Rack stock file could not be read or written",
        OnEndSwitchError = 0x0401 => "Press reached the end switch",
        PressMovingUpTimeout = 0x0402 => "Press did not reach the upper position in time",
        PressMovingDownTimeout = 0x0403 => "Press did not reach the pressing position in time",
        EndSwitchInUpperPos = 0x0404 => "End switch active while press is in upper position",
        PressConflictingMoves = 0x0405 => "Press received conflicting move commands",
        NotInClampPosError = 0x0501 => "Carriage left the clamping position",
    }
}

code_table! {
    /// Operator messages published on `StationMessageCode`.
    pub enum MessageCode {
        NoMessage = 0x0000 => "No message",
        CancelJob = 0x1001 => "Job cancelled by operator",
        MaterialWithdrawalDone = 0x1002 => "Material withdrawn",
        MaterialRefillDone = 0x1003 => "Rack refilled",
        MaterialResetDone = 0x1004 => "Rack stock reset",
        RackErrorByDiceCounting = 0x1101 => "Dice-half count corrected, rack reported empty",
        WrongNumRackFull = 0x1102 => "Dice-half count corrected to rack capacity",
        RackEmpty = 0x1103 => "Dice-half rack is empty, refill required",
        DispatchOccupied = 0x1104 => "Dispatch position is occupied",
        InitializationRequired = 0x1201 => "Initialization required after acknowledgement",
    }
}

impl ErrorCode {
    /// Codes that require a full re-initialization once acknowledged.
    pub const fn requires_init(self) -> bool {
        matches!(
            self,
            Self::FatalError
                | Self::Estop
                | Self::NoConnection
                | Self::HomingServiceTimeout
                | Self::PressingServiceTimeout
                | Self::InitServiceTimeout
                | Self::DeviceFault
                | Self::CarriageMovingToRackTimeout
                | Self::CarriageMovingToDispatchTimeout
                | Self::OnEndSwitchError
                | Self::PressMovingUpTimeout
                | Self::PressMovingDownTimeout
                | Self::EndSwitchInUpperPos
                | Self::PressConflictingMoves
                | Self::NotInClampPosError
        )
    }
}
