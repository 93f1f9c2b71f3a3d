use courier_daemon::event::{Event, HandleEvent};

pub struct EventPrinter;

impl HandleEvent for EventPrinter {
    fn handle_event(&mut self, event: Event) {
        match event {
            Event::ListenerStartedListening(port) => {
                println!("listener started listening on {port}");
            }
            Event::AuthorizationGranted {
                user,
                sender,
                oracle,
            } => {
                println!("\"{user}\" authorized \"{sender}\" with oracle \"{oracle}\"");
            }
            Event::AuthorizationRevoked { user, sender } => {
                println!("\"{user}\" revoked \"{sender}\"");
            }
            Event::MessagesAccepted { sender, recipients } => {
                println!("accepted message from \"{sender}\" for {recipients} recipients");
            }
            Event::MessageDelivered { oracle, id } => {
                println!("oracle \"{oracle}\" confirmed delivery of message {id}");
            }
            Event::RequestRejected(reason) => {
                println!("rejected request: {reason}");
            }
            Event::DBError(error) => {
                println!("db error: {error}");
            }
        }
    }
}
