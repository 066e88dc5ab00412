// Raw data loading: player stats, role table and round exports from CSV.
//
// Column names follow the demo parser's export (including its
// `flahes_thrown` spelling); the friendlier snake_case names are accepted
// as aliases. A malformed or invalid player row fails the load, since a
// silently shortened roster skews every team figure; role and round rows
// are skipped with a warning.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use fragscope_core::model::{BuyType, Side};
use fragscope_core::{MetricsError, RawPlayerStats, Role, RoleInfo, RoundData};
use serde::Deserialize;
use tracing::{info, warn};

use crate::config::DataPaths;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum DataError {
    #[error("failed to read file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv { path: String, source: csv::Error },

    #[error("invalid player on line {line} of {path}: {source}")]
    InvalidPlayer {
        path: String,
        line: u64,
        source: MetricsError,
    },

    #[error("validation error: {0}")]
    Validation(String),
}

/// Failure while reading a player export.
#[derive(Debug, thiserror::Error)]
pub enum PlayerRowError {
    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error("line {line}: {source}")]
    Invalid { line: u64, source: MetricsError },
}

// ---------------------------------------------------------------------------
// Raw CSV serde structs (private)
// ---------------------------------------------------------------------------

/// Player export row. Counting columns missing from the file default to 0;
/// side ADR/KAST columns may be absent or blank.
#[derive(Debug, Deserialize)]
struct RawPlayerRow {
    #[serde(default)]
    steam_id: String,
    #[serde(alias = "name")]
    user_name: String,
    #[serde(alias = "team", default)]
    team_clan_name: String,

    #[serde(default)]
    kills: u32,
    #[serde(default)]
    deaths: u32,
    #[serde(default)]
    assists: u32,
    #[serde(default)]
    headshots: u32,

    #[serde(default)]
    adr: f64,
    #[serde(alias = "T_adr", default)]
    adr_t: Option<f64>,
    #[serde(alias = "CT_adr", default)]
    adr_ct: Option<f64>,
    #[serde(default)]
    kast: f64,
    #[serde(alias = "T_kast", default)]
    kast_t: Option<f64>,
    #[serde(alias = "CT_kast", default)]
    kast_ct: Option<f64>,

    #[serde(alias = "flashes_thrown", default)]
    flahes_thrown: u32,
    #[serde(rename = "T_flahes_thrown", alias = "t_flashes_thrown", default)]
    t_flashes_thrown: u32,
    #[serde(rename = "CT_flahes_thrown", alias = "ct_flashes_thrown", default)]
    ct_flashes_thrown: u32,
    #[serde(default)]
    smokes_thrown: u32,
    #[serde(default)]
    he_thrown: u32,
    #[serde(default)]
    infernos_thrown: u32,
    #[serde(alias = "total_utility_thrown", default)]
    total_util_thrown: u32,
    #[serde(default)]
    utility_damage: u32,
    #[serde(alias = "flash_assists", default)]
    assisted_flashes: u32,

    #[serde(alias = "entry_kills", default)]
    first_kills: u32,
    #[serde(alias = "entry_deaths", default)]
    first_deaths: u32,
    #[serde(rename = "T_first_kills", alias = "t_entry_kills", default)]
    t_first_kills: u32,
    #[serde(rename = "T_first_deaths", alias = "t_entry_deaths", default)]
    t_first_deaths: u32,
    #[serde(rename = "CT_first_kills", alias = "ct_entry_kills", default)]
    ct_first_kills: u32,
    #[serde(rename = "CT_first_deaths", alias = "ct_entry_deaths", default)]
    ct_first_deaths: u32,

    #[serde(default)]
    awp_kills: u32,
    #[serde(default)]
    trade_kills: u32,
    #[serde(alias = "through_smoke_kills", default)]
    through_smoke: u32,
    #[serde(default)]
    multi_kills: u32,
    #[serde(default)]
    clutch_wins: u32,
    #[serde(default)]
    clutch_attempts: u32,

    #[serde(default)]
    rounds_played: u32,
    #[serde(default)]
    maps_played: u32,
    #[serde(alias = "rounds_won", default)]
    total_rounds_won: u32,
    #[serde(default)]
    t_rounds_won: u32,
    #[serde(default)]
    ct_rounds_won: u32,

    #[serde(default)]
    rating: Option<f64>,
    #[serde(default)]
    impact: Option<f64>,
}

impl RawPlayerRow {
    fn into_stats(self) -> RawPlayerStats {
        RawPlayerStats {
            steam_id: self.steam_id.trim().to_string(),
            name: self.user_name.trim().to_string(),
            team: self.team_clan_name.trim().to_string(),
            kills: self.kills,
            deaths: self.deaths,
            assists: self.assists,
            headshots: self.headshots,
            adr: self.adr,
            adr_t: self.adr_t,
            adr_ct: self.adr_ct,
            kast: self.kast,
            kast_t: self.kast_t,
            kast_ct: self.kast_ct,
            flashes_thrown: self.flahes_thrown,
            t_flashes_thrown: self.t_flashes_thrown,
            ct_flashes_thrown: self.ct_flashes_thrown,
            smokes_thrown: self.smokes_thrown,
            he_thrown: self.he_thrown,
            infernos_thrown: self.infernos_thrown,
            total_utility_thrown: self.total_util_thrown,
            utility_damage: self.utility_damage,
            flash_assists: self.assisted_flashes,
            entry_kills: self.first_kills,
            entry_deaths: self.first_deaths,
            t_entry_kills: self.t_first_kills,
            t_entry_deaths: self.t_first_deaths,
            ct_entry_kills: self.ct_first_kills,
            ct_entry_deaths: self.ct_first_deaths,
            awp_kills: self.awp_kills,
            trade_kills: self.trade_kills,
            through_smoke_kills: self.through_smoke,
            multi_kills: self.multi_kills,
            clutch_wins: self.clutch_wins,
            clutch_attempts: self.clutch_attempts,
            rounds_played: self.rounds_played,
            maps_played: self.maps_played,
            rounds_won: self.total_rounds_won,
            t_rounds_won: self.t_rounds_won,
            ct_rounds_won: self.ct_rounds_won,
            rating: self.rating.unwrap_or(0.0),
            impact: self.impact.unwrap_or(0.0),
        }
    }
}

/// Role table row, as maintained by hand in a spreadsheet.
#[derive(Debug, Deserialize)]
struct RawRoleRow {
    #[serde(rename = "Player")]
    player: String,
    #[serde(rename = "Steam ID", default)]
    steam_id: String,
    #[serde(rename = "Team", default)]
    team: String,
    #[serde(rename = "In-Game Leader?", default)]
    igl: String,
    #[serde(rename = "T Role", default)]
    t_role: String,
    #[serde(rename = "CT Role", default)]
    ct_role: String,
}

/// Round export row. Equipment values may carry thousands separators.
#[derive(Debug, Deserialize)]
struct RawRoundRow {
    round_num: u32,
    #[serde(rename = "CT_team_clan_name")]
    ct_team: String,
    #[serde(rename = "T_team_clan_name")]
    t_team: String,
    winner_clan_name: String,
    #[serde(rename = "CT_buy_type", default)]
    ct_buy_type: String,
    #[serde(rename = "T_buy_type", default)]
    t_buy_type: String,
    #[serde(rename = "CT_team_current_equip_value", default)]
    ct_equip_value: String,
    #[serde(rename = "T_team_current_equip_value", default)]
    t_equip_value: String,
    #[serde(rename = "5v4_advantage", default)]
    advantage_5v4: String,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Parse an equipment value such as `"12,350"`. Blank means 0.
fn parse_equip_value(s: &str) -> Option<u32> {
    let cleaned: String = s.chars().filter(|c| *c != ',' && !c.is_whitespace()).collect();
    if cleaned.is_empty() {
        return Some(0);
    }
    let v: f64 = cleaned.parse().ok()?;
    if v.is_finite() && v >= 0.0 {
        Some(v.round() as u32)
    } else {
        None
    }
}

fn is_yes(s: &str) -> bool {
    matches!(s.trim().to_lowercase().as_str(), "yes" | "y" | "true" | "1")
}

// ---------------------------------------------------------------------------
// Reader-based loaders
// ---------------------------------------------------------------------------

/// Parse player stats rows. The first row that fails to deserialize or
/// fails validation is returned as an error. Rows with every field blank
/// (trailing separator lines from spreadsheet exports) are skipped.
pub fn load_players_from_reader<R: Read>(rdr: R) -> Result<Vec<RawPlayerStats>, PlayerRowError> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(rdr);
    let headers = reader.headers()?.clone();
    let mut record = csv::StringRecord::new();
    let mut players = Vec::new();
    while reader.read_record(&mut record)? {
        let line = record.position().map_or(0, |p| p.line());
        if record.iter().all(str::is_empty) {
            warn!("skipping blank player row on line {}", line);
            continue;
        }
        let row: RawPlayerRow = record.deserialize(Some(&headers))?;
        let stats = row.into_stats();
        stats
            .validate()
            .map_err(|source| PlayerRowError::Invalid { line, source })?;
        players.push(stats);
    }
    Ok(players)
}

/// Parse the role table into a map keyed by steam id when the row has one,
/// otherwise by player name. Later rows win on duplicate keys.
pub fn load_roles_from_reader<R: Read>(rdr: R) -> Result<BTreeMap<String, RoleInfo>, csv::Error> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(rdr);
    let mut roles = BTreeMap::new();
    for result in reader.deserialize::<RawRoleRow>() {
        match result {
            Ok(row) => {
                let key = if row.steam_id.trim().is_empty() {
                    row.player.trim().to_string()
                } else {
                    row.steam_id.trim().to_string()
                };
                if key.is_empty() {
                    warn!("skipping role row for team '{}': no player", row.team.trim());
                    continue;
                }
                let info = RoleInfo {
                    is_igl: is_yes(&row.igl),
                    t_role: Role::parse(&row.t_role),
                    ct_role: Role::parse(&row.ct_role),
                };
                if roles.insert(key.clone(), info).is_some() {
                    warn!("duplicate role entry for '{}', using latest row", key);
                }
            }
            Err(e) => {
                warn!("skipping malformed role row: {}", e);
            }
        }
    }
    Ok(roles)
}

/// Parse round export rows.
pub fn load_rounds_from_reader<R: Read>(rdr: R) -> Result<Vec<RoundData>, csv::Error> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(rdr);
    let mut rounds = Vec::new();
    for result in reader.deserialize::<RawRoundRow>() {
        match result {
            Ok(row) => {
                let (Some(ct_equip), Some(t_equip)) = (
                    parse_equip_value(&row.ct_equip_value),
                    parse_equip_value(&row.t_equip_value),
                ) else {
                    warn!(
                        "skipping round {} ({} vs {}): bad equipment value",
                        row.round_num, row.ct_team, row.t_team
                    );
                    continue;
                };
                rounds.push(RoundData {
                    round_num: row.round_num,
                    ct_team: row.ct_team.trim().to_string(),
                    t_team: row.t_team.trim().to_string(),
                    winner_team: row.winner_clan_name.trim().to_string(),
                    ct_buy_type: BuyType::from_label(&row.ct_buy_type),
                    t_buy_type: BuyType::from_label(&row.t_buy_type),
                    ct_equip_value: ct_equip,
                    t_equip_value: t_equip,
                    advantage_5v4: Side::from_str_side(&row.advantage_5v4),
                });
            }
            Err(e) => {
                warn!("skipping malformed round row: {}", e);
            }
        }
    }
    Ok(rounds)
}

// ---------------------------------------------------------------------------
// Public path-based loaders
// ---------------------------------------------------------------------------

fn open(path: &Path) -> Result<std::fs::File, DataError> {
    std::fs::File::open(path).map_err(|e| DataError::Io {
        path: path.display().to_string(),
        source: e,
    })
}

fn csv_err(path: &Path) -> impl FnOnce(csv::Error) -> DataError + '_ {
    move |e| DataError::Csv {
        path: path.display().to_string(),
        source: e,
    }
}

/// Load player stats from a CSV file.
pub fn load_players(path: &Path) -> Result<Vec<RawPlayerStats>, DataError> {
    load_players_from_reader(open(path)?).map_err(|e| match e {
        PlayerRowError::Csv(source) => csv_err(path)(source),
        PlayerRowError::Invalid { line, source } => DataError::InvalidPlayer {
            path: path.display().to_string(),
            line,
            source,
        },
    })
}

/// Load the role table from a CSV file.
pub fn load_roles(path: &Path) -> Result<BTreeMap<String, RoleInfo>, DataError> {
    load_roles_from_reader(open(path)?).map_err(csv_err(path))
}

/// Load round exports from a CSV file.
pub fn load_rounds(path: &Path) -> Result<Vec<RoundData>, DataError> {
    load_rounds_from_reader(open(path)?).map_err(csv_err(path))
}

// ---------------------------------------------------------------------------
// Data source
// ---------------------------------------------------------------------------

/// The raw inputs of one scoring run, read from the configured CSV paths.
#[derive(Debug, Clone)]
pub struct CsvDataSource {
    paths: DataPaths,
}

impl CsvDataSource {
    pub fn new(paths: DataPaths) -> Self {
        Self { paths }
    }

    /// Player stats. An export with no valid rows is an error.
    pub fn fetch_raw_players(&self) -> Result<Vec<RawPlayerStats>, DataError> {
        let players = load_players(Path::new(&self.paths.players))?;
        if players.is_empty() {
            return Err(DataError::Validation(format!(
                "player CSV {} produced zero valid rows",
                self.paths.players
            )));
        }
        info!("loaded {} players from {}", players.len(), self.paths.players);
        Ok(players)
    }

    /// Role table. A missing file is not an error: every role is inferred.
    pub fn fetch_roles(&self) -> Result<BTreeMap<String, RoleInfo>, DataError> {
        let path = Path::new(&self.paths.roles);
        if !path.exists() {
            warn!(
                "role table {} not found, all roles will be inferred",
                self.paths.roles
            );
            return Ok(BTreeMap::new());
        }
        let roles = load_roles(path)?;
        info!("loaded {} role entries from {}", roles.len(), self.paths.roles);
        Ok(roles)
    }

    /// Round exports; empty when no rounds path is configured.
    pub fn fetch_rounds(&self) -> Result<Vec<RoundData>, DataError> {
        let Some(rounds_path) = self.paths.rounds.as_deref() else {
            return Ok(Vec::new());
        };
        let rounds = load_rounds(Path::new(rounds_path))?;
        info!("loaded {} rounds from {}", rounds.len(), rounds_path);
        Ok(rounds)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // -- Players --

    #[test]
    fn player_csv_demo_parser_columns() {
        let csv_data = "\
steam_id,user_name,team_clan_name,kills,deaths,assists,headshots,adr,kast,flahes_thrown,T_flahes_thrown,CT_flahes_thrown,total_util_thrown,assisted_flashes,first_kills,first_deaths,T_first_kills,CT_first_kills,through_smoke,total_rounds_won,t_rounds_won,ct_rounds_won
76561198001,ZywOo,Vitality,250,160,60,110,88.4,76.1,90,50,40,300,22,40,20,25,15,6,180,85,95";

        let players = load_players_from_reader(csv_data.as_bytes()).unwrap();
        assert_eq!(players.len(), 1);
        let p = &players[0];
        assert_eq!(p.steam_id, "76561198001");
        assert_eq!(p.name, "ZywOo");
        assert_eq!(p.team, "Vitality");
        assert_eq!(p.kills, 250);
        assert_eq!(p.flashes_thrown, 90);
        assert_eq!(p.t_flashes_thrown, 50);
        assert_eq!(p.total_utility_thrown, 300);
        assert_eq!(p.flash_assists, 22);
        assert_eq!(p.entry_kills, 40);
        assert_eq!(p.t_entry_kills, 25);
        assert_eq!(p.through_smoke_kills, 6);
        assert_eq!(p.rounds_won, 180);
        assert!((p.adr - 88.4).abs() < f64::EPSILON);
        assert_eq!(p.adr_t, None);
        assert_eq!(p.rating, 0.0);
    }

    #[test]
    fn player_csv_friendly_aliases_and_side_values() {
        let csv_data = "\
name,team,kills,deaths,adr,adr_t,adr_ct,kast,kast_t,kast_ct,flash_assists
ropz,FaZe,20,10,80,85,75,70,72,68,4
rain,FaZe,15,15,70,,,65,,,1";

        let players = load_players_from_reader(csv_data.as_bytes()).unwrap();
        assert_eq!(players.len(), 2);
        assert_eq!(players[0].name, "ropz");
        assert_eq!(players[0].adr_t, Some(85.0));
        assert_eq!(players[0].kast_ct, Some(68.0));
        assert_eq!(players[0].flash_assists, 4);
        assert_eq!(players[1].adr_t, None);
        assert_eq!(players[1].kast_t, None);
    }

    #[test]
    fn kast_over_100_fails_the_load() {
        let csv_data = "\
name,team,kills,deaths,adr,kast
good,NAVI,20,10,80,70
kast_over,NAVI,20,10,80,140
also_good,NAVI,12,12,70,65";

        match load_players_from_reader(csv_data.as_bytes()).unwrap_err() {
            PlayerRowError::Invalid {
                line,
                source: MetricsError::InvalidStat { player, field, value },
            } => {
                assert_eq!(line, 3);
                assert_eq!(player, "kast_over");
                assert_eq!(field, "kast");
                assert_eq!(value, 140.0);
            }
            other => panic!("expected InvalidStat, got: {other}"),
        }
    }

    #[test]
    fn blank_adr_fails_the_load() {
        let csv_data = "\
name,team,kills,deaths,adr,kast
good,NAVI,20,10,80,70
no_adr,NAVI,12,12,,65";

        match load_players_from_reader(csv_data.as_bytes()).unwrap_err() {
            PlayerRowError::Csv(_) => {}
            other => panic!("expected Csv, got: {other}"),
        }
    }

    #[test]
    fn negative_count_fails_the_load() {
        let csv_data = "\
name,team,kills,deaths,adr,kast
negative,NAVI,-3,10,80,70";

        assert!(matches!(
            load_players_from_reader(csv_data.as_bytes()),
            Err(PlayerRowError::Csv(_))
        ));
    }

    #[test]
    fn all_blank_rows_are_skipped() {
        let csv_data = "\
name,team,kills,deaths,adr,kast
good,NAVI,20,10,80,70
,,,,,
also_good,NAVI,12,12,70,65";

        let players = load_players_from_reader(csv_data.as_bytes()).unwrap();
        let names: Vec<_> = players.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["good", "also_good"]);
    }

    #[test]
    fn invalid_player_file_reports_path_and_line() {
        let dir = std::env::temp_dir().join("fragscope_data_tests");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("players_bad_kast.csv");
        std::fs::write(&path, "name,team,kills,deaths,adr,kast\nb,NAVI,5,5,70,140\n").unwrap();

        let source = CsvDataSource::new(DataPaths {
            players: path.display().to_string(),
            roles: "does/not/exist_roles.csv".into(),
            rounds: None,
        });
        match source.fetch_raw_players().unwrap_err() {
            DataError::InvalidPlayer { path, line, source } => {
                assert!(path.ends_with("players_bad_kast.csv"));
                assert_eq!(line, 2);
                assert!(matches!(source, MetricsError::InvalidStat { .. }));
            }
            other => panic!("expected InvalidPlayer, got: {other}"),
        }
    }

    #[test]
    fn empty_player_csv_returns_empty_vec() {
        let players = load_players_from_reader("name,team,kills\n".as_bytes()).unwrap();
        assert!(players.is_empty());
    }

    // -- Roles --

    #[test]
    fn role_csv_parses_aliases_and_igl() {
        let csv_data = "\
Team,Player,In-Game Leader?,T Role,CT Role
Vitality,apEX,Yes,Spacetaker,Anchor
Vitality,ZywOo,No,AWPer,AWP
MOUZ,Brollan,No,Sniper,Rotator";

        let roles = load_roles_from_reader(csv_data.as_bytes()).unwrap();
        assert_eq!(roles.len(), 3);
        let apex = roles.get("apEX").unwrap();
        assert!(apex.is_igl);
        assert_eq!(apex.t_role, Role::Spacetaker);
        assert_eq!(apex.ct_role, Role::Anchor);
        assert_eq!(roles.get("ZywOo").unwrap().t_role, Role::AWP);
        assert!(!roles.get("ZywOo").unwrap().is_igl);
        assert_eq!(roles.get("Brollan").unwrap().t_role, Role::Support);
    }

    #[test]
    fn role_csv_keys_by_steam_id_when_present() {
        let csv_data = "\
Team,Player,Steam ID,In-Game Leader?,T Role,CT Role
FaZe,karrigan,76561197989430253,Yes,Lurker,Anchor";

        let roles = load_roles_from_reader(csv_data.as_bytes()).unwrap();
        assert!(roles.contains_key("76561197989430253"));
        assert!(!roles.contains_key("karrigan"));
    }

    #[test]
    fn role_csv_duplicate_uses_latest() {
        let csv_data = "\
Team,Player,In-Game Leader?,T Role,CT Role
G2,m0NESY,No,AWP,AWP
G2,m0NESY,No,Lurker,Rotator";

        let roles = load_roles_from_reader(csv_data.as_bytes()).unwrap();
        assert_eq!(roles.get("m0NESY").unwrap().t_role, Role::Lurker);
    }

    // -- Rounds --

    #[test]
    fn round_csv_parses_buy_types_and_advantage() {
        let csv_data = "\
round_num,CT_team_clan_name,T_team_clan_name,winner_clan_name,CT_buy_type,T_buy_type,CT_team_current_equip_value,T_team_current_equip_value,5v4_advantage
1,MOUZ,Vitality,Vitality,Full Eco,Full Eco,\"4,000\",\"3,900\",t
2,MOUZ,Vitality,MOUZ,Full Buy,Semi-Buy,\"24,150\",\"11,200\",
3,MOUZ,Vitality,MOUZ,Full Buy,Full Buy,abc,\"20,000\",ct";

        let rounds = load_rounds_from_reader(csv_data.as_bytes()).unwrap();
        assert_eq!(rounds.len(), 2);
        assert_eq!(rounds[0].ct_equip_value, 4000);
        assert_eq!(rounds[0].advantage_5v4, Some(Side::T));
        assert_eq!(rounds[0].t_buy_type, BuyType::FullEco);
        assert_eq!(rounds[1].ct_buy_type, BuyType::FullBuy);
        assert_eq!(rounds[1].t_buy_type, BuyType::SemiBuy);
        assert_eq!(rounds[1].ct_equip_value, 24150);
        assert_eq!(rounds[1].advantage_5v4, None);
    }

    #[test]
    fn equip_value_parsing() {
        assert_eq!(parse_equip_value("12,350"), Some(12350));
        assert_eq!(parse_equip_value(""), Some(0));
        assert_eq!(parse_equip_value("-5"), None);
        assert_eq!(parse_equip_value("n/a"), None);
    }

    // -- Data source --

    #[test]
    fn missing_role_table_is_empty_map() {
        let source = CsvDataSource::new(DataPaths {
            players: "does/not/exist.csv".into(),
            roles: "does/not/exist_roles.csv".into(),
            rounds: None,
        });
        assert!(source.fetch_roles().unwrap().is_empty());
        assert!(source.fetch_rounds().unwrap().is_empty());
        match source.fetch_raw_players().unwrap_err() {
            DataError::Io { path, .. } => assert!(path.ends_with("exist.csv")),
            other => panic!("expected Io, got: {other}"),
        }
    }
}
