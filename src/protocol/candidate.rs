// author: kodeholic (powered by Claude)
// ICE candidate 문자열 파서
//
// 문법 (공백 구분 고정 필드):
//   candidate:<foundation> <component> <protocol> <priority> <ip> <port>
//       typ <type> [generation <n>] [ufrag <frag>]
//
// 필수 필드 누락/숫자 파싱 실패는 전부 ParseError — 호출자는 해당
// candidate를 버리고 세션은 유지한다. 브라우저가 뒤에 덧붙이는
// network-id / network-cost 등의 알 수 없는 속성 쌍은 무시한다.

use std::fmt;

/// 파싱된 candidate 파라미터
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateParams {
    pub foundation: String,
    pub component:  u32,
    /// 소문자로 정규화됨 ("udp" / "tcp")
    pub protocol:   String,
    pub priority:   u32,
    pub ip:         String,
    pub port:       u16,
    /// "host" | "srflx" | "prflx" | "relay"
    pub kind:       String,
    pub generation: Option<u32>,
    pub username_fragment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CandidateParseError {
    /// "candidate:" 접두사가 없거나 필수 필드 수 미달
    Malformed,
    /// "typ" 키워드 누락
    MissingType,
    /// 숫자 필드 파싱 실패 (필드명)
    BadNumber(&'static str),
}

impl fmt::Display for CandidateParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CandidateParseError::Malformed => write!(f, "Invalid candidate format"),
            CandidateParseError::MissingType => write!(f, "Missing 'typ' field"),
            CandidateParseError::BadNumber(field) => write!(f, "Non-numeric field: {}", field),
        }
    }
}

impl std::error::Error for CandidateParseError {}

/// candidate 문자열을 구조화된 파라미터로 파싱
pub fn parse(candidate: &str) -> Result<CandidateParams, CandidateParseError> {
    let mut tokens = candidate.split_whitespace();

    let head = tokens.next().ok_or(CandidateParseError::Malformed)?;
    let foundation = head
        .strip_prefix("candidate:")
        .filter(|f| !f.is_empty())
        .ok_or(CandidateParseError::Malformed)?;

    let component = parse_num(tokens.next(), "component")?;
    let protocol = tokens
        .next()
        .ok_or(CandidateParseError::Malformed)?
        .to_ascii_lowercase();
    let priority = parse_num(tokens.next(), "priority")?;
    let ip = tokens.next().ok_or(CandidateParseError::Malformed)?;

    let port: u32 = parse_num(tokens.next(), "port")?;
    let port = u16::try_from(port).map_err(|_| CandidateParseError::BadNumber("port"))?;

    match tokens.next() {
        Some("typ") => {}
        _ => return Err(CandidateParseError::MissingType),
    }
    let kind = tokens.next().ok_or(CandidateParseError::MissingType)?;

    // 후행 속성 쌍 — generation / ufrag만 수집, 나머지는 무시
    let mut generation = None;
    let mut username_fragment = None;
    while let Some(key) = tokens.next() {
        let value = match tokens.next() {
            Some(v) => v,
            None => break, // 값 없는 고아 키 — 무시
        };
        match key {
            "generation" => {
                generation = Some(parse_num(Some(value), "generation")?);
            }
            "ufrag" => {
                username_fragment = Some(value.to_string());
            }
            _ => {}
        }
    }

    Ok(CandidateParams {
        foundation: foundation.to_string(),
        component,
        protocol,
        priority,
        ip: ip.to_string(),
        port,
        kind: kind.to_string(),
        generation,
        username_fragment,
    })
}

fn parse_num(token: Option<&str>, field: &'static str) -> Result<u32, CandidateParseError> {
    token
        .ok_or(CandidateParseError::Malformed)?
        .parse::<u32>()
        .map_err(|_| CandidateParseError::BadNumber(field))
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOST: &str = "candidate:842163049 1 udp 1677729535 192.168.0.12 54321 typ host";

    #[test]
    fn parse_host_candidate() {
        let params = parse(HOST).unwrap();
        assert_eq!(params.foundation, "842163049");
        assert_eq!(params.component, 1);
        assert_eq!(params.protocol, "udp");
        assert_eq!(params.priority, 1677729535);
        assert_eq!(params.ip, "192.168.0.12");
        assert_eq!(params.port, 54321);
        assert_eq!(params.kind, "host");
        assert_eq!(params.generation, None);
        assert_eq!(params.username_fragment, None);
    }

    #[test]
    fn parse_with_generation_and_ufrag() {
        let s = format!("{} generation 0 ufrag abCD", HOST);
        let params = parse(&s).unwrap();
        assert_eq!(params.generation, Some(0));
        assert_eq!(params.username_fragment, Some("abCD".to_string()));
    }

    #[test]
    fn protocol_is_lowercased() {
        let s = "candidate:1 1 UDP 100 10.0.0.1 9 typ srflx";
        assert_eq!(parse(s).unwrap().protocol, "udp");
    }

    #[test]
    fn trailing_unknown_attributes_are_ignored() {
        // 크롬이 붙이는 network-id / network-cost
        let s = format!("{} generation 0 ufrag x network-id 1 network-cost 10", HOST);
        let params = parse(&s).unwrap();
        assert_eq!(params.generation, Some(0));
        assert_eq!(params.username_fragment, Some("x".to_string()));
    }

    #[test]
    fn missing_typ_is_error() {
        let s = "candidate:1 1 udp 100 10.0.0.1 9 host";
        assert_eq!(parse(s), Err(CandidateParseError::MissingType));
    }

    #[test]
    fn missing_prefix_is_error() {
        let s = "1 1 udp 100 10.0.0.1 9 typ host";
        assert_eq!(parse(s), Err(CandidateParseError::Malformed));
    }

    #[test]
    fn non_numeric_priority_is_error() {
        let s = "candidate:1 1 udp high 10.0.0.1 9 typ host";
        assert_eq!(parse(s), Err(CandidateParseError::BadNumber("priority")));
    }

    #[test]
    fn port_out_of_range_is_error() {
        let s = "candidate:1 1 udp 100 10.0.0.1 70000 typ host";
        assert_eq!(parse(s), Err(CandidateParseError::BadNumber("port")));
    }

    #[test]
    fn truncated_candidate_is_error() {
        assert!(parse("candidate:1 1 udp").is_err());
        assert!(parse("").is_err());
        assert!(parse("candidate:").is_err());
    }

    #[test]
    fn ipv6_address_passes_through() {
        let s = "candidate:3 1 udp 100 2001:db8::1 443 typ relay";
        let params = parse(s).unwrap();
        assert_eq!(params.ip, "2001:db8::1");
        assert_eq!(params.kind, "relay");
    }
}
