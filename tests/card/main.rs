
use assuan_card::{
    blocking::Client,
    error::AgentError,
    proto::{Card, CardKey, KeyRole, Pin, ProtoError, PublicKey, Sex},
    transport::{KeyResolver, Transport},
};
use rstest::rstest;
use testresult::TestResult;

use self::script::Script;

const LEARN: &str = "LEARN --sendinfo --ssh-fpr";
const SERIAL: &str = "D2760001240103040006123456780000";
const SIGNATURE_GRIP: &str = "6D2F5E9A1C8B3F0E7A4D2B9C5E8F1A3D7B0C6E2F";
const AUTHENTICATION_GRIP: &str = "0A1B2C3D4E5F60718293A4B5C6D7E8F901234567";

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn finish<R: KeyResolver>(client: Client<Script, R>) -> Vec<String> {
    let script = client.into_inner();
    assert!(script.pending().is_empty(), "not sent: {:?}", script.pending());
    script.sent
}

#[test]
fn current_card_resolves_keys() -> TestResult {
    init_logging();
    let script = Script::default()
        .expect(
            LEARN,
            &[
                b"S PROGRESS learncard k 0 0",
                b"S READER Yubico YubiKey OTP FIDO CCID 00 00",
                format!("S SERIALNO {SERIAL}").as_bytes(),
                b"S APPTYPE openpgp",
                b"S DISP-NAME Doe<<Jane",
                b"S DISP-SEX 2",
                b"S SIG-COUNTER 12",
                b"S CHV-STATUS +0+127+127+127+3+0+3",
                format!("S KEYPAIRINFO {SIGNATURE_GRIP} OPENPGP.1").as_bytes(),
                b"S KEY-FPR 2 ABCDEF0123456789ABCDEF0123456789ABCDEF01",
                format!("S KEYPAIRINFO {AUTHENTICATION_GRIP} OPENPGP.3").as_bytes(),
                b"D ignored",
                b"# learn done",
            ],
        )
        .expect(
            &format!("READKEY {SIGNATURE_GRIP}"),
            &[b"D (10:public-key(3:ecc", b"D (5:curve7:Ed25519)))"],
        )
        .expect(
            &format!("READKEY {AUTHENTICATION_GRIP}"),
            &[b"D (10:public-key(3:rsa))"],
        );
    let client = Client::new(script);

    let card = client.current_card()?;
    assert_eq!(card.reader, "Yubico YubiKey OTP FIDO CCID 00 00");
    assert_eq!(card.serial, SERIAL);
    assert_eq!(card.app_type, "openpgp");
    assert_eq!(card.display_name, "Doe<<Jane");
    assert_eq!(card.display_sex, Sex::Female);
    assert_eq!(card.signature_counter, 12);
    assert_eq!(card.pin_retry_counter, [3, 0, 3]);

    let signature = card.signature_key().ok_or("signature key")?;
    assert_eq!(
        signature.public_key,
        Some(PublicKey {
            keygrip: SIGNATURE_GRIP.into(),
            sexp: b"(10:public-key(3:ecc(5:curve7:Ed25519)))".to_vec(),
        })
    );
    let encryption = card.encryption_key().ok_or("encryption key")?;
    assert_eq!(encryption.keygrip, None);
    assert_eq!(encryption.public_key, None);
    let authentication = card.authentication_key().ok_or("authentication key")?;
    assert_eq!(
        authentication.public_key.as_ref().map(|key| key.sexp.as_slice()),
        Some(&b"(10:public-key(3:rsa))"[..])
    );

    assert_eq!(
        finish(client),
        [
            LEARN.to_string(),
            format!("READKEY {SIGNATURE_GRIP}"),
            format!("READKEY {AUTHENTICATION_GRIP}"),
        ]
    );
    Ok(())
}

#[test]
fn current_card_rejects_unknown_status() {
    let script = Script::default().expect(LEARN, &[b"S SERIALNO 1234", b"S GIBBERISH 12345"]);
    let client = Client::new(script);

    assert!(matches!(
        client.current_card(),
        Err(AgentError::Proto(ProtoError::UnknownProperty { keyword, .. })) if keyword == "GIBBERISH"
    ));
}

#[test]
fn current_card_reports_agent_errors() {
    let script = Script::default().fail(LEARN, 100_663_406, "Card removed");
    let client = Client::new(script);

    assert!(matches!(
        client.current_card(),
        Err(AgentError::Failed { code: 100_663_406, message }) if message == "Card removed"
    ));
}

#[rstest]
#[case::name(
    |client: &Client<Script>| client.set_display_name("Doe<<Jane Q"),
    "scd SETATTR DISP-NAME Doe<<Jane+Q"
)]
#[case::sex(
    |client: &Client<Script>| client.set_display_sex(Sex::NotApplicable),
    "scd SETATTR DISP-SEX 9"
)]
#[case::language(
    |client: &Client<Script>| client.set_display_language("deen"),
    "scd SETATTR DISP-LANG deen"
)]
#[case::login(
    |client: &Client<Script>| client.set_login_data("jane+doe@example.org"),
    "scd SETATTR LOGIN-DATA jane%2Bdoe@example.org"
)]
#[case::reset_user(
    |client: &Client<Script>| client.reset_password(Pin::User),
    "scd PASSWD --reset 1"
)]
#[case::reset_admin(
    |client: &Client<Script>| client.reset_password(Pin::Admin),
    "scd PASSWD --reset 3"
)]
#[case::set_user(|client: &Client<Script>| client.set_pin(Pin::User), "scd PASSWD 1")]
#[case::set_admin(|client: &Client<Script>| client.set_pin(Pin::Admin), "scd PASSWD 3")]
fn inquiring_commands(
    #[case] operation: fn(&Client<Script>) -> Result<(), AgentError>,
    #[case] command: &str,
) -> TestResult {
    let script = Script::default().expect(
        command,
        &[
            b"S PINENTRY_LAUNCHED 4242 gnome3 1.2.1",
            b"INQUIRE PINENTRY_LAUNCHED 4242 gnome3 1.2.1",
            b"# waiting for the user",
            b"S PROGRESS",
        ],
    );
    let client = Client::new(script);

    operation(&client)?;
    assert_eq!(finish(client), [command, "END"]);
    Ok(())
}

#[rstest]
#[case(Pin::User, "scd CHECKPIN D2760001240103040006123456780000")]
#[case(Pin::Admin, "scd CHECKPIN D2760001240103040006123456780000[CHV3]")]
fn check_pin(#[case] pin: Pin, #[case] command: &str) -> TestResult {
    let script = Script::default().expect(command, &[b"INQUIRE NEEDPIN ||Please enter the PIN"]);
    let client = Client::new(script);
    let card = Card {
        serial: SERIAL.into(),
        ..Default::default()
    };

    client.check_pin(&card, pin)?;
    assert_eq!(finish(client), [command, "END"]);
    Ok(())
}

#[test]
fn inquiring_command_rejects_data() {
    let script = Script::default().expect("scd PASSWD 1", &[b"D %90%00"]);
    let client = Client::new(script);

    assert!(matches!(
        client.set_pin(Pin::User),
        Err(AgentError::Proto(ProtoError::UnexpectedResponse(_)))
    ));
}

#[test]
fn wrong_pin_is_reported() {
    let script = Script::default().fail("scd PASSWD 3", 100_663_383, "Bad PIN");
    let client = Client::new(script);

    assert!(matches!(
        client.set_pin(Pin::Admin),
        Err(AgentError::Failed { code: 100_663_383, .. })
    ));
}

/// Resolves keys without asking the agent.
#[derive(Debug)]
struct Offline;

impl KeyResolver for Offline {
    fn resolve(
        &mut self,
        _transport: &mut dyn Transport,
        keygrip: &str,
    ) -> Result<PublicKey, AgentError> {
        Ok(PublicKey {
            keygrip: keygrip.into(),
            sexp: vec![],
        })
    }
}

#[test]
fn add_key_generates_and_relearns() -> TestResult {
    init_logging();
    let fingerprint = "0123456789ABCDEF0123456789ABCDEF01234567";
    let script = Script::default()
        .expect(
            "scd GENKEY 3",
            &[
                b"S PROGRESS primegen ? 0 0",
                b"# generating, this may take a while",
                b"INQUIRE NEEDPIN ||Please enter the Admin PIN",
                b"S KEY-DATA q 4047A8B2",
                format!("S KEY-FPR {fingerprint}").as_bytes(),
                b"S KEY-CREATED-AT 1700000000",
                b"S SIG-COUNTER 1",
            ],
        )
        .expect("RESET", &[])
        .expect(
            LEARN,
            &[
                format!("S SERIALNO {SERIAL}").as_bytes(),
                format!("S KEYPAIRINFO {AUTHENTICATION_GRIP} OPENPGP.3").as_bytes(),
                format!("S KEY-FPR 3 {fingerprint}").as_bytes(),
            ],
        );
    let client = Client::with_resolver(script, Offline);

    let mut card = Card::default();
    card.subkeys[KeyRole::Authentication.index()] = Some(CardKey {
        keygrip: Some("stale".into()),
        ..Default::default()
    });

    client.add_key(&mut card, KeyRole::Authentication)?;

    assert_eq!(card.serial, SERIAL);
    assert_eq!(card.signature_counter, 1);
    let key = card.authentication_key().ok_or("generated key")?;
    assert_eq!(key.keygrip.as_deref(), Some(AUTHENTICATION_GRIP));
    assert_eq!(key.fingerprint.as_deref(), Some(fingerprint));
    assert_eq!(key.created.map(|at| at.timestamp()), Some(1_700_000_000));
    assert_eq!(
        key.public_key.as_ref().map(|key| key.keygrip.as_str()),
        Some(AUTHENTICATION_GRIP)
    );

    assert_eq!(finish(client), ["scd GENKEY 3", "END", "RESET", LEARN]);
    Ok(())
}

#[test]
fn add_key_needs_keygrip() {
    let script = Script::default()
        .expect("scd GENKEY 1", &[b"S KEY-FPR ABCD"])
        .expect("RESET", &[])
        .expect(LEARN, &[format!("S SERIALNO {SERIAL}").as_bytes()]);
    let client = Client::new(script);

    let mut card = Card::default();
    assert!(matches!(
        client.add_key(&mut card, KeyRole::Signature),
        Err(AgentError::Proto(ProtoError::MissingResponse("KEYPAIRINFO")))
    ));
    assert_eq!(
        card.signature_key().and_then(|key| key.fingerprint.as_deref()),
        Some("ABCD")
    );
}

#[test]
fn add_key_stops_on_generation_failure() {
    let script = Script::default().fail("scd GENKEY 2", 100_663_404, "Conditions of use not satisfied");
    let client = Client::new(script);

    let mut card = Card::default();
    assert!(matches!(
        client.add_key(&mut card, KeyRole::Encryption),
        Err(AgentError::Failed { .. })
    ));
    assert_eq!(client.into_inner().sent, ["scd GENKEY 2"]);
}

const VERIFY_PW1: &str = "scd APDU 00200081084040404040404040";
const VERIFY_PW3: &str = "scd APDU 00200083084040404040404040";

fn blocking_answers(script: Script, command: &str) -> Script {
    (0..4).fold(script, |script, attempt| {
        let line = format!("D %63%{:02X}", 0xc0 + attempt);
        script.expect(command, &[line.as_bytes()])
    })
}

#[test]
fn factory_reset_blocks_and_wipes() -> TestResult {
    init_logging();
    let script = Script::default()
        .expect("scd RESET", &[])
        .expect("scd SERIALNO", &[format!("S SERIALNO {SERIAL}").as_bytes()]);
    let script = blocking_answers(script, VERIFY_PW1);
    let script = blocking_answers(script, VERIFY_PW3)
        .expect("scd APDU 00e60000", &[b"D %90%00"])
        .expect("scd APDU 00440000", &[b"D %90%00"]);
    let client = Client::new(script);

    client.factory_reset()?;

    let sent = finish(client);
    assert_eq!(sent.len(), 12);
    assert_eq!(sent[..2], ["scd RESET", "scd SERIALNO"]);
    assert!(sent[2..6].iter().all(|command| command == VERIFY_PW1));
    assert!(sent[6..10].iter().all(|command| command == VERIFY_PW3));
    assert_eq!(sent[10..], ["scd APDU 00e60000", "scd APDU 00440000"]);
    Ok(())
}

#[test]
fn factory_reset_aborts_on_unexpected_counter() {
    let script = Script::default()
        .expect("scd RESET", &[])
        .expect("scd SERIALNO", &[])
        .expect(VERIFY_PW1, &[b"D %63%C0"])
        .expect(VERIFY_PW1, &[b"D %63%C0"]);
    let client = Client::new(script);

    assert!(matches!(
        client.factory_reset(),
        Err(AgentError::Proto(ProtoError::UnexpectedApdu { attempt: 1, .. }))
    ));
    assert_eq!(
        finish(client),
        ["scd RESET", "scd SERIALNO", VERIFY_PW1, VERIFY_PW1]
    );
}

#[test]
fn factory_reset_aborts_without_answer() {
    let script = Script::default()
        .expect("scd RESET", &[])
        .expect("scd SERIALNO", &[])
        .expect(VERIFY_PW1, &[]);
    let client = Client::new(script);

    assert!(matches!(
        client.factory_reset(),
        Err(AgentError::Proto(ProtoError::MissingResponse("APDU")))
    ));
    assert_eq!(finish(client).len(), 3);
}
