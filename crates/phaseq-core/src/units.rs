use quantity::{BAR, KELVIN, KILO, PASCAL, Pressure, Temperature};
use serde::{Deserialize, Serialize};
use std::fmt;

const ZERO_CELSIUS: f64 = 273.15;
const ATMOSPHERE: f64 = 101325.0;

/// Unit tag of a temperature supplied by the caller.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TemperatureUnit {
    #[default]
    #[serde(rename = "C")]
    Celsius,
    #[serde(rename = "K")]
    Kelvin,
}

impl TemperatureUnit {
    /// Attach the unit to a number.
    pub fn quantity(self, value: f64) -> Temperature {
        match self {
            Self::Celsius => (value + ZERO_CELSIUS) * KELVIN,
            Self::Kelvin => value * KELVIN,
        }
    }

    /// Express a temperature in this unit.
    pub fn value(self, temperature: Temperature) -> f64 {
        let t = temperature.convert_into(KELVIN);
        match self {
            Self::Celsius => t - ZERO_CELSIUS,
            Self::Kelvin => t,
        }
    }
}

/// Unit tag of a pressure supplied by the caller.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum PressureUnit {
    #[default]
    #[serde(rename = "kPa")]
    KiloPascal,
    #[serde(rename = "Pa")]
    Pascal,
    #[serde(rename = "bar")]
    Bar,
    #[serde(rename = "atm")]
    Atmosphere,
}

impl PressureUnit {
    /// Attach the unit to a number.
    pub fn quantity(self, value: f64) -> Pressure {
        match self {
            Self::KiloPascal => value * KILO * PASCAL,
            Self::Pascal => value * PASCAL,
            Self::Bar => value * BAR,
            Self::Atmosphere => value * ATMOSPHERE * PASCAL,
        }
    }

    /// Express a pressure in this unit.
    pub fn value(self, pressure: Pressure) -> f64 {
        match self {
            Self::KiloPascal => pressure.convert_into(KILO * PASCAL),
            Self::Pascal => pressure.convert_into(PASCAL),
            Self::Bar => pressure.convert_into(BAR),
            Self::Atmosphere => pressure.convert_into(PASCAL) / ATMOSPHERE,
        }
    }
}

impl fmt::Display for TemperatureUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Celsius => write!(f, "°C"),
            Self::Kelvin => write!(f, "K"),
        }
    }
}

impl fmt::Display for PressureUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KiloPascal => write!(f, "kPa"),
            Self::Pascal => write!(f, "Pa"),
            Self::Bar => write!(f, "bar"),
            Self::Atmosphere => write!(f, "atm"),
        }
    }
}
