//! Tables de traduction des codes VE.Direct en texte lisible.
//!
//! Utilisées pour les payloads MQTT et le live view: le client final voit
//! "Bulk" plutôt que `3`.

/// Nom commercial à partir du product id (`PID`)
pub fn pid_name(pid: u32) -> String {
    let name = match pid {
        0x0300 => "BlueSolar MPPT 70|15",
        0xA040 => "BlueSolar MPPT 75|50",
        0xA042 => "BlueSolar MPPT 75|15",
        0xA043 => "BlueSolar MPPT 100|15",
        0xA044 => "BlueSolar MPPT 100|30",
        0xA045 => "BlueSolar MPPT 100|50",
        0xA04C => "BlueSolar MPPT 75|10",
        0xA053 => "SmartSolar MPPT 75|15",
        0xA054 => "SmartSolar MPPT 75|10",
        0xA055 => "SmartSolar MPPT 100|15",
        0xA056 => "SmartSolar MPPT 100|30",
        0xA057 => "SmartSolar MPPT 100|50",
        0xA058 => "SmartSolar MPPT 150|35",
        0xA05A => "SmartSolar MPPT 150|100",
        0xA05B => "SmartSolar MPPT 150|45",
        0xA05C => "SmartSolar MPPT 150|60",
        0xA05D => "SmartSolar MPPT 150|70",
        0xA05E => "SmartSolar MPPT 250|85",
        0xA05F => "SmartSolar MPPT 250|100",
        0xA060 => "SmartSolar MPPT 100|20",
        0xA075 => "SmartSolar MPPT 150|35 rev2",
        _ => return format!("0x{:04X}", pid),
    };
    name.to_string()
}

/// État de charge (`CS`)
pub fn cs_name(cs: u8) -> String {
    let name = match cs {
        0 => "OFF",
        2 => "Fault",
        3 => "Bulk",
        4 => "Absorbtion",
        5 => "Float",
        7 => "Equalize (manual)",
        245 => "Starting-up",
        247 => "Auto equalize / Recondition",
        252 => "External Control",
        _ => return cs.to_string(),
    };
    name.to_string()
}

/// Code d'erreur (`ERR`)
pub fn err_name(err: u8) -> String {
    let name = match err {
        0 => "No error",
        2 => "Battery voltage too high",
        17 => "Charger temperature too high",
        18 => "Charger over current",
        19 => "Charger current reversed",
        20 => "Bulk time limit exceeded",
        21 => "Current sensor issue",
        26 => "Terminals overheated",
        28 => "Converter issue",
        33 => "Input voltage too high (solar panel)",
        34 => "Input current too high (solar panel)",
        38 => "Input shutdown (excessive battery voltage)",
        39 => "Input shutdown (due to current flow during off mode)",
        65 => "Lost communication with one of devices",
        66 => "Synchronised charging device configuration issue",
        67 => "BMS connection lost",
        68 => "Network misconfigured",
        116 => "Factory calibration data lost",
        117 => "Invalid/incompatible firmware",
        119 => "User settings invalid",
        _ => return err.to_string(),
    };
    name.to_string()
}

/// Raison d'arrêt (`OR`), masque de bits: on traduit le premier bit connu
pub fn or_name(or: u32) -> String {
    const REASONS: [(u32, &str); 9] = [
        (0x0000_0001, "No input power"),
        (0x0000_0002, "Switched off (power switch)"),
        (0x0000_0004, "Switched off (device mode register)"),
        (0x0000_0008, "Remote input"),
        (0x0000_0010, "Protection active"),
        (0x0000_0020, "Paygo"),
        (0x0000_0040, "BMS"),
        (0x0000_0080, "Engine shutdown detection"),
        (0x0000_0100, "Analysing input voltage"),
    ];

    if or == 0 {
        return "Not off".to_string();
    }
    REASONS
        .iter()
        .find(|(bit, _)| or & bit != 0)
        .map(|(_, name)| name.to_string())
        .unwrap_or_else(|| format!("0x{:08X}", or))
}

/// Mode du tracker (`MPPT`)
pub fn mppt_name(mppt: u8) -> String {
    let name = match mppt {
        0 => "OFF",
        1 => "Voltage or current limited",
        2 => "MPP Tracker active",
        _ => return mppt.to_string(),
    };
    name.to_string()
}
