//! Canned device pages shaped like the charger's firmware output.

pub const STATUS_PAGE: &str = "<html><head><meta charset=utf-8><title>CHARGEU</title></head><body>
<div class=ins><br>
Charging
</div>
<table>
<tr><td>Фаза</td><td><span class=ins>L1</span></td></tr>
<tr><td>Струм</td><td><span class=ins>15.8</span> A</td></tr>
<tr><td>Напруга</td><td><span class=ins>229.6</span> V</td></tr>
<tr><td>Енергія</td><td><span class=ins>4.27</span> kWh</td></tr>
<tr><td>Час</td><td><span class=ins>00:45:12</span></td></tr>
</table>
</body></html>";

pub const TRUNCATED_STATUS_PAGE: &str = "<html><body>
<div class=ins><br>
Charging
</div>
<table>
<tr><td>Фаза</td><td><span class=ins>L1</span></td></tr>
<tr><td>Струм</td><td><span class=ins>15.8</span> A</td></tr>
<tr><td>Напру";

pub const SETTINGS_PAGE: &str = "<html><body><form method=post action=/setup>
<p>Струм: <select name=change>
<option value='$AMPS 6'>6 A</option>
<option selected value='$AMPS 16'>16 A</option>
<option value='$AMPS 32'>32 A</option>
</select></p>
<p>Світлова індикація: <span class=ins>ВВІМКНЕНО</span></p>
<p>Контроль заземлення: <span class=ins>ВИМКНЕНО</span></p>
<p>Передана потужність всього: <span class=ins>1234.5 kWh</span></p>
</form></body></html>";

pub fn status_page(status: &str, duration: &str) -> String {
    format!(
        "<html><body>
<div class=ins><br>
{status}
</div>
<table>
<tr><td>Фаза</td><td><span class=ins>L1</span></td></tr>
<tr><td>Струм</td><td><span class=ins>15.8</span> A</td></tr>
<tr><td>Напруга</td><td><span class=ins>229.6</span> V</td></tr>
<tr><td>Енергія</td><td><span class=ins>4.27</span> kWh</td></tr>
<tr><td>Час</td><td><span class=ins>{duration}</span></td></tr>
</table>
</body></html>"
    )
}

pub fn settings_page(
    amps: Option<u32>,
    led_on: bool,
    ground_check: bool,
    total_energy: Option<&str>,
) -> String {
    let state = |on: bool| if on { "ВВІМКНЕНО" } else { "ВИМКНЕНО" };

    let mut html = String::from("<html><body><form method=post action=/setup>\n");
    if let Some(amps) = amps {
        html.push_str(&format!(
            "<p>Струм: <select name=change><option value='$AMPS 6'>6 A</option>\
             <option selected value='$AMPS {amps}'>{amps} A</option></select></p>\n"
        ));
    }
    html.push_str(&format!(
        "<p>Світлова індикація: <span class=ins>{}</span></p>\n",
        state(led_on)
    ));
    html.push_str(&format!(
        "<p>Контроль заземлення: <span class=ins>{}</span></p>\n",
        state(ground_check)
    ));
    if let Some(total) = total_energy {
        html.push_str(&format!(
            "<p>Передана потужність всього: <span class=ins>{total} kWh</span></p>\n"
        ));
    }
    html.push_str("</form></body></html>");
    html
}

pub fn security_page(locked: bool, session_active: bool) -> String {
    let avail = if locked { 0 } else { 1 };
    let temps = if session_active { 0 } else { 1 };
    format!(
        "<html><body><form method=post action=/pass>
<p>Доступ: <span class=ins>{}</span></p>
<button name=change1 value='$AVAIL {avail}'>Змінити</button>
<button name=change1 value='$TEMPS {temps}'>Сесія</button>
</form></body></html>",
        if locked { "ЗАБЛОКОВАНО" } else { "ВІДКРИТО" }
    )
}
