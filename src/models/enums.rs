use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern.
/// The wire (serde) and storage spellings are the same literal.
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $s)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

str_enum!(Role {
    Admin => "Admin",
    Doctor => "Doctor",
    Receptionist => "Receptionist",
    LabTechnician => "Lab Technician",
    Patient => "Patient",
});

str_enum!(Specialization {
    Cardiology => "Cardiology",
    Dermatology => "Dermatology",
    Neurology => "Neurology",
    Orthopedics => "Orthopedics",
    Pediatrics => "Pediatrics",
    Psychiatry => "Psychiatry",
    Radiology => "Radiology",
    GeneralMedicine => "General Medicine",
    Gynecology => "Gynecology",
    Ent => "ENT",
    Ophthalmology => "Ophthalmology",
    Oncology => "Oncology",
});

str_enum!(AppointmentStatus {
    Scheduled => "Scheduled",
    CheckedIn => "Checked-In",
    Consulted => "Consulted",
    Completed => "Completed",
    Cancelled => "Cancelled",
});

str_enum!(AppointmentPaymentStatus {
    Pending => "Pending",
    Paid => "Paid",
});

str_enum!(LabTestStatus {
    Pending => "Pending",
    ReportSent => "Report Sent",
});

str_enum!(LabPaymentStatus {
    Pending => "Pending",
    Paid => "Paid",
    PaymentVerified => "Payment Verified",
});

str_enum!(PaymentMethod {
    Cash => "Cash",
    Card => "Card",
    Insurance => "Insurance",
    Online => "Online",
});

str_enum!(PaymentStatus {
    Paid => "Paid",
});

str_enum!(DayOfWeek {
    Monday => "Monday",
    Tuesday => "Tuesday",
    Wednesday => "Wednesday",
    Thursday => "Thursday",
    Friday => "Friday",
    Saturday => "Saturday",
    Sunday => "Sunday",
});

impl Role {
    const fn bit(self) -> u8 {
        match self {
            Self::Admin => 1 << 0,
            Self::Doctor => 1 << 1,
            Self::Receptionist => 1 << 2,
            Self::LabTechnician => 1 << 3,
            Self::Patient => 1 << 4,
        }
    }

    /// Everyone except patients.
    pub fn is_staff(self) -> bool {
        !matches!(self, Self::Patient)
    }
}

/// Closed set of roles a route admits. No hierarchy: Admin is only a
/// member when listed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleSet(u8);

impl RoleSet {
    pub const ANY: Self = Self::of(&[
        Role::Admin,
        Role::Doctor,
        Role::Receptionist,
        Role::LabTechnician,
        Role::Patient,
    ]);

    pub const fn of(roles: &[Role]) -> Self {
        let mut bits = 0;
        let mut i = 0;
        while i < roles.len() {
            bits |= roles[i].bit();
            i += 1;
        }
        Self(bits)
    }

    pub const fn contains(self, role: Role) -> bool {
        self.0 & role.bit() != 0
    }
}
