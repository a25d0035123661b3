//! Physical units attached to numeric fields (`units` property).

/// Units of a numeric value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Units {
    #[default]
    Unknown,
    Nanoseconds,
    Microseconds,
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
    Days,
    Weeks,
    Nanometers,
    Micrometers,
    Millimeters,
    Centimeters,
    Meters,
    Kilometers,
    NanometersPerSecond,
    MicrometersPerSecond,
    MillimetersPerSecond,
    CentimetersPerSecond,
    MetersPerSecond,
    KilometersPerSecond,
    KilometersPerHour,
    Hertz,
    KiloHertz,
    MegaHertz,
    GigaHertz,
    Degrees,
    Radians,
    Nanoamps,
    Microamps,
    Milliamps,
    Amps,
    Kiloamps,
    Nanovolts,
    Microvolts,
    Millivolts,
    Volts,
    Kilovolts,
    Bytes,
    Kilobytes,
    Megabytes,
    Gigabytes,
    Terabytes,
}

impl Units {
    /// Parse a unit name; case and embedded blanks are ignored.
    pub fn parse(value: &str) -> Option<Units> {
        let key: String = value
            .chars()
            .filter(|c| *c != ' ' && *c != '\t')
            .collect::<String>()
            .to_ascii_lowercase();
        let units = match key.as_str() {
            "" => Units::Unknown,
            "ns" | "nanosec" | "nanosecs" | "nanosecond" | "nanoseconds" => Units::Nanoseconds,
            "us" | "microsec" | "microsecs" | "microsecond" | "microseconds" => Units::Microseconds,
            "ms" | "millisec" | "millisecs" | "millisecond" | "milliseconds" => Units::Milliseconds,
            "s" | "sec" | "secs" | "second" | "seconds" => Units::Seconds,
            "min" | "mins" | "minute" | "minutes" => Units::Minutes,
            "h" | "hour" | "hours" => Units::Hours,
            "d" | "day" | "days" => Units::Days,
            "w" | "week" | "weeks" => Units::Weeks,
            "nm" | "nanometer" | "nanometre" | "nanometers" | "nanometres" => Units::Nanometers,
            "um" | "micrometer" | "micrometre" | "micrometers" | "micrometres" => Units::Micrometers,
            "mm" | "millimeter" | "millimetre" | "millimeters" | "millimetres" => Units::Millimeters,
            "cm" | "centimeter" | "centimetre" | "centimeters" | "centimetres" => Units::Centimeters,
            "m" | "meter" | "metre" | "meters" | "metres" => Units::Meters,
            "km" | "kilometer" | "kilometre" | "kilometers" | "kilometres" => Units::Kilometers,
            "nm/s" | "nmps" | "nanometer/second" | "nanometre/second" | "nanometers/second"
            | "nanometres/second" => Units::NanometersPerSecond,
            "um/s" | "umps" | "micrometer/second" | "micrometre/second" | "micrometers/second"
            | "micrometres/second" => Units::MicrometersPerSecond,
            "mm/s" | "mmps" | "millimeter/second" | "millimetre/second" | "millimeters/second"
            | "millimetres/second" => Units::MillimetersPerSecond,
            "cm/s" | "cmps" | "centimeter/second" | "centimetre/second" | "centimeters/second"
            | "centimetres/second" => Units::CentimetersPerSecond,
            "m/s" | "mps" | "meter/second" | "metre/second" | "meters/second" | "metres/second" => {
                Units::MetersPerSecond
            }
            "km/s" | "kmps" | "kps" | "kilometer/second" | "kilometre/second" | "kilometers/second"
            | "kilometres/second" => Units::KilometersPerSecond,
            "km/h" | "kmph" | "kph" | "kilometer/hour" | "kilometre/hour" | "kilometers/hour"
            | "kilometres/hour" => Units::KilometersPerHour,
            "hz" | "hertz" => Units::Hertz,
            "khz" | "kilohertz" => Units::KiloHertz,
            "mhz" | "megahertz" => Units::MegaHertz,
            "ghz" | "gigahertz" => Units::GigaHertz,
            "deg" | "degree" | "degrees" => Units::Degrees,
            "rad" | "radian" | "radians" => Units::Radians,
            "na" | "nanoamp" | "nanoamps" | "nanoampere" | "nanoamperes" => Units::Nanoamps,
            "ua" | "microamp" | "microamps" | "microampere" | "microamperes" => Units::Microamps,
            "ma" | "milliamp" | "milliamps" | "milliampere" | "milliamperes" => Units::Milliamps,
            "a" | "amp" | "amps" | "ampere" | "amperes" => Units::Amps,
            "ka" | "kiloamp" | "kiloamps" | "kiloampere" | "kiloamperes" => Units::Kiloamps,
            "nv" | "nanovolt" | "nanovolts" => Units::Nanovolts,
            "uv" | "microvolt" | "microvolts" => Units::Microvolts,
            "mv" | "millivolt" | "millivolts" => Units::Millivolts,
            "v" | "volt" | "volts" => Units::Volts,
            "kv" | "kilovolt" | "kilovolts" => Units::Kilovolts,
            "b" | "byte" | "bytes" => Units::Bytes,
            "kb" | "kilobyte" | "kilobytes" => Units::Kilobytes,
            "mb" | "megabyte" | "megabytes" => Units::Megabytes,
            "gb" | "gigabyte" | "gigabytes" => Units::Gigabytes,
            "tb" | "terabyte" | "terabytes" => Units::Terabytes,
            _ => return None,
        };
        Some(units)
    }

    pub fn is_time(self) -> bool {
        matches!(
            self,
            Units::Nanoseconds
                | Units::Microseconds
                | Units::Milliseconds
                | Units::Seconds
                | Units::Minutes
                | Units::Hours
                | Units::Days
                | Units::Weeks
        )
    }

    pub fn is_angle(self) -> bool {
        matches!(self, Units::Degrees | Units::Radians)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_case_and_blank_insensitive() {
        assert_eq!(Units::parse("MS"), Some(Units::Milliseconds));
        assert_eq!(Units::parse("km / h"), Some(Units::KilometersPerHour));
        assert_eq!(Units::parse(""), Some(Units::Unknown));
        assert_eq!(Units::parse("parsec"), None);
        assert!(Units::Hours.is_time());
        assert!(Units::Radians.is_angle());
    }
}
